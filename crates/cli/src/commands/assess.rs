use bandscore_agent::{AssessmentError, AssessmentRuntime};
use bandscore_core::config::{AppConfig, LoadOptions};
use bandscore_core::{AssessmentRequest, TaskCategory};
use tokio_util::sync::CancellationToken;

use crate::commands::{runtime, CommandResult};

#[derive(Debug, Clone)]
pub struct AssessArgs {
    pub category: u8,
    pub statement: String,
    pub candidate: String,
    pub user: Option<String>,
}

pub fn run(args: AssessArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "assess",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let assessments = match AssessmentRuntime::from_config(&config) {
        Ok(assessments) => assessments,
        Err(error) => return failure(&error),
    };

    let user_id = args.user.unwrap_or_else(|| config.assessment.sender_id.clone());
    let request = AssessmentRequest::new(
        user_id,
        TaskCategory::from(args.category),
        args.statement,
        args.candidate,
    );

    let runtime = match runtime("assess") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let cancel = CancellationToken::new();
    let result = runtime.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });
        assessments.assess(&request, &cancel).await
    });

    match result {
        Ok(assessment) => {
            let details = serde_json::to_value(&assessment).ok();
            CommandResult::success_with_details("assess", assessment.text.clone(), details)
        }
        Err(error) => failure(&error),
    }
}

fn failure(error: &AssessmentError) -> CommandResult {
    let (error_class, exit_code) = match error {
        AssessmentError::InvalidRequest(_) => ("invalid_request", 2),
        AssessmentError::Configuration(_) => ("config_validation", 2),
        AssessmentError::Session(_) => ("session", 4),
        AssessmentError::Transport(_) => ("transport", 4),
        AssessmentError::Timeout { .. } => ("timeout", 5),
        AssessmentError::RejectionExhausted { .. } => ("rejected", 6),
    };
    CommandResult::failure("assess", error_class, error.to_string(), exit_code)
}
