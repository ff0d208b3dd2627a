use ratify_core::approvals::ApprovalService;
use ratify_core::authorization::GrantAuthorizer;
use ratify_core::config::AppConfig;
use ratify_core::domain::approval::{ApprovalAction, ApprovalStatus};
use ratify_core::errors::{ApprovalError, InterfaceError};
use ratify_db::SqlApprovalEventStore;
use serde_json::{json, Value};

use crate::commands::{open_database, prepare, CommandResult};

type CliService = ApprovalService<SqlApprovalEventStore, GrantAuthorizer>;

/// What to do with the subject named in an [`ApprovalRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Status,
    History,
    Act(ApprovalAction),
}

impl Operation {
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::History => "history",
            Self::Act(action) => action.as_str(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ApprovalRequest {
    pub subject_type: String,
    pub subject_id: String,
    pub user: Option<String>,
    pub binary: i64,
    pub status: Option<ApprovalStatus>,
}

impl ApprovalRequest {
    pub fn subject(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            ..Self::default()
        }
    }
}

pub fn run(operation: Operation, request: ApprovalRequest) -> CommandResult {
    let command = operation.command_name();
    let (config, runtime) = match prepare(command) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    runtime.block_on(execute(operation, request, config))
}

async fn execute(
    operation: Operation,
    request: ApprovalRequest,
    config: AppConfig,
) -> CommandResult {
    let command = operation.command_name();
    let pool = match open_database(command, &config).await {
        Ok(pool) => pool,
        Err(failure) => return failure,
    };

    let service = ApprovalService::new(
        SqlApprovalEventStore::new(pool.clone()),
        GrantAuthorizer::new(config.authorization.grants),
    );
    let outcome = perform(&service, operation, request).await;
    pool.close().await;

    match outcome {
        Ok((message, data)) => CommandResult::success_with_data(command, message, data),
        Err(error) => {
            let error_class = error.kind();
            let message = error.to_string();
            let interface = error.into_interface(format!("cli-{}", std::process::id()));
            tracing::warn!(
                event_name = "cli.approval.rejected",
                command,
                error_class,
                correlation_id = interface.correlation_id(),
                "{message}"
            );
            CommandResult::failure(
                command,
                error_class,
                format!("{} ({message})", interface.user_message()),
                exit_code_for(&interface),
            )
        }
    }
}

async fn perform(
    service: &CliService,
    operation: Operation,
    request: ApprovalRequest,
) -> Result<(String, Value), ApprovalError> {
    let mut handle = service
        .model(request.subject_type.as_str(), request.subject_id.as_str())
        .binary(request.binary);
    if let Some(user) = request.user {
        handle = handle.user(user);
    }
    if let Some(status) = request.status {
        handle = handle.status(status);
    }
    let subject = handle.subject().clone();

    match operation {
        Operation::Status => {
            let status = handle.current_status().await?;
            Ok((format!("{subject} is {status}"), json!({ "subject": subject, "status": status })))
        }
        Operation::History => {
            let events = handle.history().await?;
            Ok((
                format!("{} events for {subject}", events.len()),
                json!({ "subject": subject, "events": events }),
            ))
        }
        Operation::Act(action) => {
            let event = match action {
                ApprovalAction::Submit => handle.store().await?,
                ApprovalAction::Approve => handle.approve().await?,
                ApprovalAction::Reject => handle.reject().await?,
                ApprovalAction::Cancel => handle.cancel().await?,
                ApprovalAction::Rollback => handle.rollback().await?,
                ApprovalAction::Force => handle.force().await?,
            };
            tracing::info!(
                event_name = "cli.approval.recorded",
                event_id = event.id.0,
                subject = %event.subject,
                action = %event.action,
                status = %event.status,
                actor_id = %event.actor_id,
                "approval event recorded"
            );
            Ok((
                format!("{subject} is now {} after {}", event.status, event.action),
                json!({ "event": event }),
            ))
        }
    }
}

fn exit_code_for(error: &InterfaceError) -> u8 {
    match error {
        InterfaceError::BadRequest { .. } => 6,
        InterfaceError::Forbidden { .. } => 7,
        InterfaceError::NotFound { .. } => 8,
        InterfaceError::Conflict { .. } => 9,
        InterfaceError::ServiceUnavailable { .. } => 10,
    }
}
