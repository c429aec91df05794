//! Admin actions run on the records selected in a list view.
//!
//! An action receives the request and the selected records and answers with
//! a response, usually a redirect. Outcomes for the user go through the
//! session [`messages`](crate::messages).

use std::sync::Arc;

use async_trait::async_trait;

use simple_auth::backends::{login, AuthBackend, RequestUserExt};
use simple_auth::User;
use simple_auth_core::AuthResult;
use simple_auth_http::{HttpRequest, HttpResponse, HttpResponseRedirect};

use crate::changelist::AdminRecord;
use crate::messages;

/// Shown when an action is submitted without a selection.
pub const NO_SELECTION: &str =
    "Items must be selected in order to perform actions on them. No items have been changed.";
/// Shown when the hijack action gets more than one user.
pub const ONLY_ONE_USER: &str = "You can only log-in as one user!";

/// A bulk operation offered on a list view.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use simple_auth::Group;
/// use simple_auth_admin::actions::AdminAction;
/// use simple_auth_core::AuthResult;
/// use simple_auth_http::{HttpRequest, HttpResponse};
///
/// struct CountAction;
///
/// #[async_trait]
/// impl AdminAction<Group> for CountAction {
///     fn name(&self) -> &str { "count" }
///     fn description(&self) -> &str { "Count selected groups" }
///     async fn execute(
///         &self,
///         _request: &mut HttpRequest,
///         selected: Vec<Group>,
///     ) -> AuthResult<HttpResponse> {
///         Ok(HttpResponse::ok(selected.len().to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait AdminAction<T: AdminRecord>: Send + Sync {
    /// The identifier posted as the `action` form field.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Runs the action. `selected` is never empty.
    async fn execute(
        &self,
        request: &mut HttpRequest,
        selected: Vec<T>,
    ) -> AuthResult<HttpResponse>;
}

/// The actions available on one model's list view.
pub struct ActionRegistry<T: AdminRecord> {
    actions: Vec<Arc<dyn AdminAction<T>>>,
}

impl<T: AdminRecord> Default for ActionRegistry<T> {
    fn default() -> Self {
        Self { actions: Vec::new() }
    }
}

impl<T: AdminRecord> ActionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action, replacing one with the same name.
    pub fn register(&mut self, action: Arc<dyn AdminAction<T>>) {
        self.actions.retain(|a| a.name() != action.name());
        self.actions.push(action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AdminAction<T>>> {
        self.actions.iter().find(|a| a.name() == name).cloned()
    }

    /// `(name, description)` pairs, in registration order.
    pub fn choices(&self) -> Vec<(String, String)> {
        self.actions
            .iter()
            .map(|a| (a.name().to_string(), a.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs `name` on `selected`.
    ///
    /// Returns `None` for an unknown action. An empty selection queues the
    /// "Items must be selected" message and redirects back to the list.
    pub async fn run(
        &self,
        name: &str,
        request: &mut HttpRequest,
        selected: Vec<T>,
    ) -> AuthResult<Option<HttpResponse>> {
        let Some(action) = self.get(name) else {
            return Ok(None);
        };
        if selected.is_empty() {
            messages::warning(request, NO_SELECTION).await?;
            return Ok(Some(HttpResponseRedirect::new(&request.get_full_path())));
        }
        action.execute(request, selected).await.map(Some)
    }
}

impl<T: AdminRecord> std::fmt::Debug for ActionRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.iter().map(|a| a.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Logs the admin in as the one selected user.
///
/// The session becomes that user's; the user record itself is untouched.
pub struct HijackAction {
    backend: Arc<dyn AuthBackend>,
    secret_key: String,
    redirect_to: String,
}

impl HijackAction {
    pub fn new(backend: Arc<dyn AuthBackend>, secret_key: impl Into<String>) -> Self {
        Self {
            backend,
            secret_key: secret_key.into(),
            redirect_to: "/".to_string(),
        }
    }

    /// Where to send the admin once logged in as the user. Defaults to `/`.
    #[must_use]
    pub fn redirect_to(mut self, url: impl Into<String>) -> Self {
        self.redirect_to = url.into();
        self
    }
}

impl std::fmt::Debug for HijackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HijackAction")
            .field("backend", &self.backend.path())
            .field("redirect_to", &self.redirect_to)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AdminAction<User> for HijackAction {
    fn name(&self) -> &str {
        "hijack"
    }

    fn description(&self) -> &str {
        "Log in as selected user"
    }

    async fn execute(
        &self,
        request: &mut HttpRequest,
        selected: Vec<User>,
    ) -> AuthResult<HttpResponse> {
        let [user] = selected.as_slice() else {
            messages::error(request, ONLY_ONE_USER).await?;
            return Ok(HttpResponseRedirect::new(&request.get_full_path()));
        };
        let hijacker = request.user().and_then(|u| u.id);
        login(request, user, self.backend.as_ref(), &self.secret_key).await?;
        tracing::warn!(
            hijacker = ?hijacker,
            user_id = ?user.id,
            email = %user.email,
            "admin logged in as another user"
        );
        Ok(HttpResponseRedirect::new(&self.redirect_to))
    }
}

#[cfg(test)]
mod tests {
    use simple_auth::backends::{ModelBackend, SESSION_KEY};
    use simple_auth::hashers::{PasswordHashers, Pbkdf2Hasher};
    use simple_auth::manager::{ExtraFields, UserManager};
    use simple_auth::store::{InMemoryStore, Store, UserStore};
    use simple_auth::Group;
    use simple_auth_http::Session;

    use super::*;

    const SECRET: &str = "actions-secret";

    struct Fixture {
        store: Arc<dyn Store>,
        backend: Arc<ModelBackend>,
        admin: User,
        alice: User,
        bob: User,
    }

    async fn fixture() -> Fixture {
        let hashers =
            PasswordHashers::new(vec![Arc::new(Pbkdf2Hasher { iterations: 1000 })]).unwrap();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let manager = UserManager::new(store.clone()).with_hashers(hashers.clone());
        let admin = manager
            .create_superuser("admin@example.com", Some("pw"), ExtraFields::new())
            .await
            .unwrap();
        let alice = manager
            .create_user("alice@example.com", Some("pw"), ExtraFields::new())
            .await
            .unwrap();
        let bob = manager
            .create_user("bob@example.com", Some("pw"), ExtraFields::new())
            .await
            .unwrap();
        let backend = Arc::new(ModelBackend::new(store.clone()).with_hashers(hashers));
        Fixture { store, backend, admin, alice, bob }
    }

    async fn admin_request(f: &Fixture) -> HttpRequest {
        let mut request = HttpRequest::builder()
            .path("/admin/simple_authentication/user/")
            .query_string("is_staff=false")
            .build();
        request.set_session(Session::new_empty(3600));
        login(&mut request, &f.admin, f.backend.as_ref(), SECRET).await.unwrap();
        request
    }

    fn registry(f: &Fixture) -> ActionRegistry<User> {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(HijackAction::new(f.backend.clone(), SECRET)));
        registry
    }

    async fn session_user(request: &HttpRequest) -> Option<String> {
        request.session().unwrap().get_str(SESSION_KEY).await
    }

    // ── ActionRegistry ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_registry_lookup() {
        let f = fixture().await;
        let mut registry = registry(&f);
        registry.register(Arc::new(HijackAction::new(f.backend.clone(), SECRET)));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.choices(),
            vec![("hijack".to_string(), "Log in as selected user".to_string())]
        );
        assert!(registry.get("delete_selected").is_none());
        assert!(format!("{registry:?}").contains("hijack"));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let f = fixture().await;
        let mut request = admin_request(&f).await;
        let result = registry(&f).run("nope", &mut request, vec![f.alice.clone()]).await.unwrap();
        assert!(result.is_none());
    }

    // ── HijackAction ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_hijack_single_user() {
        let f = fixture().await;
        let mut request = admin_request(&f).await;

        let response = registry(&f)
            .run("hijack", &mut request, vec![f.alice.clone()])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::FOUND);
        assert_eq!(response.location(), Some("/"));
        assert_eq!(session_user(&request).await, Some(f.alice.id.unwrap().to_string()));
        assert_eq!(request.user().map(|u| u.email.clone()), Some("alice@example.com".into()));
    }

    #[tokio::test]
    async fn test_hijack_leaves_user_record_alone() {
        let f = fixture().await;
        let mut request = admin_request(&f).await;
        let before = f.store.get_user(f.alice.id.unwrap()).await.unwrap().unwrap();

        registry(&f).run("hijack", &mut request, vec![f.alice.clone()]).await.unwrap();

        let after = f.store.get_user(f.alice.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_hijack_several_users() {
        let f = fixture().await;
        let mut request = admin_request(&f).await;

        let response = registry(&f)
            .run("hijack", &mut request, vec![f.alice.clone(), f.bob.clone()])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.location(), Some("/admin/simple_authentication/user/?is_staff=false"));
        assert_eq!(session_user(&request).await, Some(f.admin.id.unwrap().to_string()));
        let pending = messages::get_messages(&request).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, ONLY_ONE_USER);
        assert_eq!(pending[0].level, messages::MessageLevel::Error);
    }

    #[tokio::test]
    async fn test_hijack_no_selection() {
        let f = fixture().await;
        let mut request = admin_request(&f).await;

        let response = registry(&f).run("hijack", &mut request, Vec::new()).await.unwrap().unwrap();

        assert_eq!(response.location(), Some("/admin/simple_authentication/user/?is_staff=false"));
        assert_eq!(session_user(&request).await, Some(f.admin.id.unwrap().to_string()));
        assert_eq!(messages::get_messages(&request).await[0].text, NO_SELECTION);
    }

    #[tokio::test]
    async fn test_generic_action_on_groups() {
        struct Count;

        #[async_trait]
        impl AdminAction<Group> for Count {
            fn name(&self) -> &str {
                "count"
            }
            fn description(&self) -> &str {
                "Count"
            }
            async fn execute(
                &self,
                _request: &mut HttpRequest,
                selected: Vec<Group>,
            ) -> AuthResult<HttpResponse> {
                Ok(HttpResponse::ok(selected.len().to_string()))
            }
        }

        let mut registry = ActionRegistry::<Group>::new();
        registry.register(Arc::new(Count));
        let mut request = HttpRequest::builder().build();
        let groups = vec![Group::new("a"), Group::new("b")];
        let response = registry.run("count", &mut request, groups).await.unwrap().unwrap();
        assert_eq!(response.text(), "2");
    }
}
