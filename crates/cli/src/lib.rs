pub mod commands;
pub mod logging;

use clap::{Args, Parser, Subcommand};
use ratify_core::domain::approval::{ApprovalAction, ApprovalStatus};
use std::process::ExitCode;

use commands::approval::{ApprovalRequest, Operation};

#[derive(Debug, Parser)]
#[command(
    name = "ratify",
    about = "Ratify approval workflow CLI",
    long_about = "Record and inspect approval decisions for any subject, apply migrations, and inspect configuration.",
    after_help = "Examples:\n  ratify migrate\n  ratify submit --subject-type invoice --subject-id 42 --user u-author\n  ratify approve --subject-type invoice --subject-id 42 --user u-lead --binary 1\n  ratify history --subject-type invoice --subject-id 42"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Show the current approval status of a subject")]
    Status(SubjectArgs),
    #[command(about = "List a subject's approval events, oldest first")]
    History(SubjectArgs),
    #[command(about = "Record a draft submission for a subject")]
    Submit(ActionArgs),
    #[command(about = "Approve a draft subject")]
    Approve(ActionArgs),
    #[command(about = "Reject a draft subject")]
    Reject(ActionArgs),
    #[command(about = "Cancel a draft subject (creator or cancel grant)")]
    Cancel(ActionArgs),
    #[command(about = "Reopen a decided subject for another decision")]
    Rollback(ActionArgs),
    #[command(about = "Set any status, bypassing the transition rules (force grant)")]
    Force(ForceArgs),
}

#[derive(Debug, Args)]
struct SubjectArgs {
    #[arg(long, help = "Subject type, e.g. `invoice`")]
    subject_type: String,
    #[arg(long, help = "Subject identifier within its type")]
    subject_id: String,
}

#[derive(Debug, Args)]
struct ActionArgs {
    #[command(flatten)]
    subject: SubjectArgs,
    #[arg(long, help = "Acting user identifier")]
    user: Option<String>,
    #[arg(long, default_value_t = 0, help = "Opaque integer stored with the event")]
    binary: i64,
}

#[derive(Debug, Args)]
struct ForceArgs {
    #[command(flatten)]
    action: ActionArgs,
    #[arg(
        long,
        value_parser = parse_status,
        help = "Target status (draft|approved|rejected|canceled|rollback)"
    )]
    status: Option<ApprovalStatus>,
}

impl ActionArgs {
    fn into_request(self, status: Option<ApprovalStatus>) -> ApprovalRequest {
        ApprovalRequest {
            subject_type: self.subject.subject_type,
            subject_id: self.subject.subject_id,
            user: self.user,
            binary: self.binary,
            status,
        }
    }
}

fn parse_status(value: &str) -> Result<ApprovalStatus, String> {
    ApprovalStatus::parse(value).ok_or_else(|| format!("unknown approval status `{value}`"))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let act = |action: ApprovalAction, args: ActionArgs| {
        commands::approval::run(Operation::Act(action), args.into_request(None))
    };

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Status(args) => commands::approval::run(
            Operation::Status,
            ApprovalRequest::subject(args.subject_type, args.subject_id),
        ),
        Command::History(args) => commands::approval::run(
            Operation::History,
            ApprovalRequest::subject(args.subject_type, args.subject_id),
        ),
        Command::Submit(args) => act(ApprovalAction::Submit, args),
        Command::Approve(args) => act(ApprovalAction::Approve, args),
        Command::Reject(args) => act(ApprovalAction::Reject, args),
        Command::Cancel(args) => act(ApprovalAction::Cancel, args),
        Command::Rollback(args) => act(ApprovalAction::Rollback, args),
        Command::Force(args) => commands::approval::run(
            Operation::Act(ApprovalAction::Force),
            args.action.into_request(args.status),
        ),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use ratify_core::domain::approval::ApprovalStatus;

    use super::{Cli, Command};

    #[test]
    fn force_accepts_status_and_binary() {
        let cli = Cli::try_parse_from([
            "ratify",
            "force",
            "--subject-type",
            "invoice",
            "--subject-id",
            "42",
            "--user",
            "u-admin",
            "--status",
            "cancelled",
            "--binary",
            "7",
        ])
        .expect("parse");

        let Command::Force(args) = cli.command else {
            panic!("expected force subcommand");
        };
        assert_eq!(args.status, Some(ApprovalStatus::Canceled));
        assert_eq!(args.action.binary, 7);
        assert_eq!(args.action.user.as_deref(), Some("u-admin"));
    }

    #[test]
    fn user_is_optional_at_parse_time() {
        let cli = Cli::try_parse_from([
            "ratify",
            "approve",
            "--subject-type",
            "invoice",
            "--subject-id",
            "42",
        ])
        .expect("parse");

        let Command::Approve(args) = cli.command else {
            panic!("expected approve subcommand");
        };
        assert_eq!(args.user, None);
        assert_eq!(args.binary, 0);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let parsed = Cli::try_parse_from([
            "ratify",
            "force",
            "--subject-type",
            "invoice",
            "--subject-id",
            "42",
            "--status",
            "pending",
        ]);

        assert!(parsed.is_err());
    }
}
