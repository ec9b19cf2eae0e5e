use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tripdesk_core::config::LoadOptions;
use tripdesk_core::domain::request::{Request, RequestId};
use tripdesk_core::domain::user::User;
use tripdesk_core::errors::{ApplicationError, WorkflowError};
use tripdesk_core::flows::RequestAction;
use tripdesk_core::notify::NoopNotifier;
use tripdesk_core::service::WorkflowService;
use tripdesk_db::{connect_with_config, sqlite_ports};

use crate::commands::{application_failure, load_config, runtime, CommandResult, StepFailure};

/// Who is asking about which request.
pub struct ActionsQuery {
    pub email: String,
    pub password: SecretString,
    pub request_id: String,
}

/// Signs in as the given user and lists what they may do to one request.
pub fn run(options: &LoadOptions, query: ActionsQuery) -> CommandResult {
    let config = match load_config("actions", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("actions") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database).await.map_err(|error| {
            application_failure(ApplicationError::Persistence(error.to_string()), None)
        })?;
        let service =
            WorkflowService::new(sqlite_ports(&pool, Arc::new(NoopNotifier)), config.workflow.clone());

        let outcome: Result<(User, Request, Vec<RequestAction>), StepFailure> = async {
            let login = service
                .authenticate(&query.email, query.password.expose_secret())
                .await
                .map_err(|error| ("authentication", error.to_string(), 7u8))?;
            let (user, correlation_id) = (login.value, login.correlation_id);
            let failure = |error: WorkflowError| application_failure(error, Some(&correlation_id));
            let request_id = RequestId(query.request_id.trim().to_string());
            let request = service.get_request(&user, &request_id).await.map_err(failure)?;
            let actions = service.allowed_actions(&user, &request_id).await.map_err(failure)?;
            Ok((user, request, actions))
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok((user, request, actions)) => {
            CommandResult::success("actions", describe(&user, &request, &actions))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("actions", error_class, message, exit_code)
        }
    }
}

fn describe(user: &User, request: &Request, actions: &[RequestAction]) -> String {
    let listed = if actions.is_empty() {
        "no actions available".to_string()
    } else {
        actions.iter().map(RequestAction::as_str).collect::<Vec<_>>().join(", ")
    };
    format!(
        "{} ({}) as {} [{}]: {listed}",
        request.id,
        request.status,
        user.name,
        user.role.display_name()
    )
}
