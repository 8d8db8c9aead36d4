use crate::domain::validation::{validate_email, validate_password};
use crate::infrastructure::credential_store::{CredentialStore, IdToken};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_api::TaskApi;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const INVALID_CREDENTIAL_CODE: &str = "auth/invalid-credential";

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInMethod {
    Password,
    /// Popup sign-in through a federated provider.
    Federated,
}

/// User-facing text for an identity-provider failure.
pub fn identity_error_message(method: SignInMethod, code: &str, message: &str) -> String {
    match method {
        SignInMethod::Federated => "Failed to login with Google. Please try again.".to_string(),
        SignInMethod::Password if code == INVALID_CREDENTIAL_CODE => {
            "Invalid credentials. Please check your email and password.".to_string()
        }
        SignInMethod::Password => message.to_string(),
    }
}

/// Field checks run before credentials are sent to the identity provider.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), InfraError> {
    validate_email(email).map_err(InfraError::InvalidInput)?;
    validate_password(password).map_err(InfraError::InvalidInput)
}

pub struct SessionManager<S, A>
where
    S: CredentialStore,
    A: TaskApi,
{
    credential_store: Arc<S>,
    api: Arc<A>,
    now_provider: NowProvider,
}

impl<S, A> SessionManager<S, A>
where
    S: CredentialStore,
    A: TaskApi,
{
    pub fn new(credential_store: Arc<S>, api: Arc<A>) -> Self {
        Self {
            credential_store,
            api,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Stores the freshly issued ID token, replacing any earlier one.
    pub fn sign_in(&self, id_token: &str) -> Result<IdToken, InfraError> {
        let token = IdToken::new(id_token, (self.now_provider)())?;
        self.credential_store.save_token(&token)?;
        tracing::info!("signed in");
        Ok(token)
    }

    pub fn access_token(&self) -> Result<String, InfraError> {
        self.credential_store
            .load_token()?
            .map(|token| token.token)
            .ok_or(InfraError::Unauthorized)
    }

    /// Logs out on the backend and always forgets the local token. A
    /// backend failure is returned after the token is gone.
    pub async fn sign_out(&self) -> Result<(), InfraError> {
        let Some(token) = self.credential_store.load_token()? else {
            return Ok(());
        };
        let result = self.api.logout(&token.token).await;
        self.credential_store.delete_token()?;
        match &result {
            Ok(()) => tracing::info!("signed out"),
            Err(error) => tracing::warn!(%error, "backend logout failed; local session cleared"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        NewTask, ProfileUpdate, Task, TaskList, TaskQuery, TaskStatus, TaskUpdate, UserProfile,
    };
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct LogoutApi {
        fail: bool,
        calls: AtomicUsize,
    }

    impl LogoutApi {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskApi for LogoutApi {
        async fn list_tasks(&self, _access_token: &str, _query: &TaskQuery) -> Result<TaskList, InfraError> {
            Ok(TaskList::default())
        }

        async fn count_due_today(&self, _access_token: &str) -> Result<u64, InfraError> {
            Ok(0)
        }

        async fn upcoming_tasks(&self, _access_token: &str) -> Result<Vec<Task>, InfraError> {
            Ok(Vec::new())
        }

        async fn create_task(&self, _access_token: &str, _task: &NewTask) -> Result<Option<Task>, InfraError> {
            Ok(None)
        }

        async fn update_task(&self, _access_token: &str, _task_id: &str, _update: &TaskUpdate) -> Result<(), InfraError> {
            Ok(())
        }

        async fn update_task_status(
            &self,
            _access_token: &str,
            _task_id: &str,
            _status: TaskStatus,
        ) -> Result<(), InfraError> {
            Ok(())
        }

        async fn delete_task(&self, _access_token: &str, _task_id: &str) -> Result<(), InfraError> {
            Ok(())
        }

        async fn fetch_profile(&self, _access_token: &str) -> Result<UserProfile, InfraError> {
            Err(InfraError::NotFound("profile".to_string()))
        }

        async fn update_profile(&self, _access_token: &str, _update: ProfileUpdate) -> Result<(), InfraError> {
            Ok(())
        }

        async fn logout(&self, access_token: &str) -> Result<(), InfraError> {
            assert_eq!(access_token, "fresh-token");
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(InfraError::Network("connection reset".to_string()));
            }
            Ok(())
        }
    }

    fn manager(fail_logout: bool) -> (SessionManager<InMemoryCredentialStore, LogoutApi>, Arc<LogoutApi>) {
        let api = Arc::new(LogoutApi::new(fail_logout));
        let manager = SessionManager::new(Arc::new(InMemoryCredentialStore::default()), Arc::clone(&api));
        (manager, api)
    }

    #[test]
    fn invalid_credential_code_gets_friendly_message() {
        assert_eq!(
            identity_error_message(SignInMethod::Password, "auth/invalid-credential", "raw"),
            "Invalid credentials. Please check your email and password."
        );
        assert_eq!(
            identity_error_message(SignInMethod::Password, "auth/too-many-requests", "Too many attempts"),
            "Too many attempts"
        );
        assert_eq!(
            identity_error_message(SignInMethod::Federated, "auth/popup-closed-by-user", "closed"),
            "Failed to login with Google. Please try again."
        );
    }

    #[test]
    fn credentials_are_checked_before_sign_in() {
        assert!(validate_credentials("ada@example.com", "Secret123").is_ok());
        assert!(matches!(
            validate_credentials("ada@example", "Secret123"),
            Err(InfraError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_credentials("ada@example.com", "short"),
            Err(InfraError::InvalidInput(_))
        ));
    }

    #[test]
    fn sign_in_replaces_previous_token() {
        let (manager, _) = manager(false);
        manager.sign_in("stale-token").expect("first sign in");
        manager.sign_in("fresh-token").expect("second sign in");
        assert_eq!(manager.access_token().expect("token"), "fresh-token");
        assert!(manager.sign_in("   ").is_err());
        assert_eq!(manager.access_token().expect("token"), "fresh-token");
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let (manager, _) = manager(false);
        assert!(matches!(manager.access_token(), Err(InfraError::Unauthorized)));
    }

    #[tokio::test]
    async fn sign_out_clears_token_even_when_backend_fails() {
        let (manager, api) = manager(true);
        manager.sign_in("fresh-token").expect("sign in");

        let result = manager.sign_out().await;

        assert!(matches!(result, Err(InfraError::Network(_))));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(manager.access_token(), Err(InfraError::Unauthorized)));
    }

    #[tokio::test]
    async fn sign_out_without_session_is_a_no_op() {
        let (manager, api) = manager(false);
        manager.sign_out().await.expect("sign out");
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}
