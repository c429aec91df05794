//! The admin views and their URL configuration.
//!
//! Views answer with JSON documents: the configured list, the form fields
//! with any validation errors, and pending messages. Successful POSTs
//! redirect. Every view except login and logout requires an active staff
//! user; anyone else is redirected to `admin:login?next=<path>`.
//!
//! | Route | Name |
//! |-------|------|
//! | `""` | `index` |
//! | `login/`, `logout/` | `login`, `logout` |
//! | `password_change/`, `password_change/done/` | `password_change`, `password_change_done` |
//! | `simple_authentication/user/` | `simple_authentication_user_changelist` |
//! | `simple_authentication/user/add/` | `simple_authentication_user_add` |
//! | `simple_authentication/user/<int:id>/change/` | `simple_authentication_user_change` |
//! | `simple_authentication/user/<int:id>/password/` | `simple_authentication_user_password` |
//! | `simple_authentication/group/` | `simple_authentication_group_changelist` |
//! | `simple_authentication/group/add/` | `simple_authentication_group_add` |

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use http::Method;
use serde_json::{json, Value};

use simple_auth::backends::{
    login, logout, update_session_auth_hash, AuthBackend, ModelBackend, RequestUserExt,
};
use simple_auth::forms::{
    AdminPasswordChangeForm, AuthenticationForm, PasswordChangeForm, UserChangeForm,
    UserCreationForm, NON_FIELD_ERRORS,
};
use simple_auth::group::{default_permissions, Permission};
use simple_auth::hashers::PasswordHashers;
use simple_auth::manager::UserManager;
use simple_auth::store::Store;
use simple_auth::user::APP_LABEL;
use simple_auth::{Group, User};
use simple_auth_core::{AuthError, AuthResult, Settings, ValidationError};
use simple_auth_http::querydict::encode;
use simple_auth_http::urls::{include, path, RouteHandler, URLEntry, URLResolver};
use simple_auth_http::{BoxFuture, HttpRequest, HttpResponse, HttpResponseRedirect, JsonResponse};

use crate::actions::{ActionRegistry, HijackAction};
use crate::changelist::{AdminRecord, ChangeList};
use crate::messages;
use crate::model_admin::ModelAdmin;
use crate::site::AdminSite;

/// The namespace and application name of the admin URLs.
pub const ADMIN_NAMESPACE: &str = "admin";
/// Form field listing the selected primary keys of a list view.
pub const ACTION_CHECKBOX_NAME: &str = "_selected_action";

const STAFF_LOGIN_REQUIRED: &str =
    "Please enter the correct email and password for a staff account. \
     Note that both fields may be case-sensitive.";
const NO_ACTION_SELECTED: &str = "No action selected.";
const GROUP_NAME_MAX_LENGTH: usize = 150;

/// Everything the admin views share.
pub struct AdminContext {
    pub site: AdminSite,
    pub store: Arc<dyn Store>,
    pub backend: Arc<ModelBackend>,
    pub manager: UserManager,
    pub hashers: PasswordHashers,
    pub user_actions: ActionRegistry<User>,
    pub secret_key: String,
    pub list_per_page: usize,
}

impl AdminContext {
    /// Builds the context over `site`, registering the hijack action.
    pub fn new(
        site: AdminSite,
        store: Arc<dyn Store>,
        hashers: PasswordHashers,
        secret_key: impl Into<String>,
    ) -> Self {
        let secret_key = secret_key.into();
        let backend = Arc::new(ModelBackend::new(store.clone()).with_hashers(hashers.clone()));
        let manager = UserManager::new(store.clone()).with_hashers(hashers.clone());
        let mut user_actions = ActionRegistry::new();
        let hijack_backend: Arc<dyn AuthBackend> = backend.clone();
        user_actions.register(Arc::new(HijackAction::new(hijack_backend, secret_key.clone())));
        Self {
            site,
            store,
            backend,
            manager,
            hashers,
            user_actions,
            secret_key,
            list_per_page: 100,
        }
    }

    /// Builds the default site, with this application's admins installed,
    /// and the context from `settings`.
    pub fn from_settings(settings: &Settings, store: Arc<dyn Store>) -> AuthResult<Self> {
        let mut site =
            AdminSite::framework_default().site_header(settings.admin.site_header.clone());
        site.install_simple_authentication()?;
        let hashers = PasswordHashers::from_names(&settings.auth.password_hashers)?;
        Ok(Self::new(site, store, hashers, settings.secret_key.clone())
            .list_per_page(settings.admin.list_per_page))
    }

    #[must_use]
    pub const fn list_per_page(mut self, count: usize) -> Self {
        self.list_per_page = count;
        self
    }

    fn user_admin(&self) -> AuthResult<ModelAdmin> {
        Ok(self.site.user_admin()?.clone().list_per_page(self.list_per_page))
    }

    fn group_admin(&self) -> AuthResult<ModelAdmin> {
        Ok(self.site.group_admin()?.clone().list_per_page(self.list_per_page))
    }
}

impl std::fmt::Debug for AdminContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminContext")
            .field("site", &self.site)
            .field("user_actions", &self.user_actions)
            .field("list_per_page", &self.list_per_page)
            .finish_non_exhaustive()
    }
}

/// The admin URL configuration, mounted under `prefix` in the `admin` namespace.
pub fn urls(ctx: &Arc<AdminContext>, prefix: &str) -> AuthResult<URLResolver> {
    let user = |route: &str| format!("{APP_LABEL}/user/{route}");
    let group = |route: &str| format!("{APP_LABEL}/group/{route}");
    let user_name = |view: &str| format!("{APP_LABEL}_user_{view}");
    let group_name = |view: &str| format!("{APP_LABEL}_group_{view}");

    let patterns = vec![
        URLEntry::Pattern(path("", staff_view(ctx, index), Some("index"))?),
        URLEntry::Pattern(path("login/", open_view(ctx, login_view), Some("login"))?),
        URLEntry::Pattern(path("logout/", open_view(ctx, logout_view), Some("logout"))?),
        URLEntry::Pattern(path(
            "password_change/",
            staff_view(ctx, password_change),
            Some("password_change"),
        )?),
        URLEntry::Pattern(path(
            "password_change/done/",
            staff_view(ctx, password_change_done),
            Some("password_change_done"),
        )?),
        URLEntry::Pattern(path(
            &user(""),
            staff_view(ctx, user_changelist),
            Some(&user_name("changelist")),
        )?),
        URLEntry::Pattern(path(
            &user("add/"),
            staff_view(ctx, user_add),
            Some(&user_name("add")),
        )?),
        URLEntry::Pattern(path(
            &user("<int:id>/change/"),
            staff_view(ctx, user_change),
            Some(&user_name("change")),
        )?),
        URLEntry::Pattern(path(
            &user("<int:id>/password/"),
            staff_view(ctx, user_password),
            Some(&user_name("password")),
        )?),
        URLEntry::Pattern(path(
            &group(""),
            staff_view(ctx, group_changelist),
            Some(&group_name("changelist")),
        )?),
        URLEntry::Pattern(path(
            &group("add/"),
            staff_view(ctx, group_add),
            Some(&group_name("add")),
        )?),
    ];
    include(prefix, patterns, Some(ADMIN_NAMESPACE), Some(ADMIN_NAMESPACE))
}

// ── Wrappers ────────────────────────────────────────────────────────

fn open_view<F, Fut>(ctx: &Arc<AdminContext>, view: F) -> RouteHandler
where
    F: Fn(Arc<AdminContext>, HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AuthResult<HttpResponse>> + Send + 'static,
{
    let ctx = ctx.clone();
    Arc::new(move |request: HttpRequest| -> BoxFuture { Box::pin(view(ctx.clone(), request)) })
}

/// Runs `view` for active staff users and redirects everyone else to login.
fn staff_view<F, Fut>(ctx: &Arc<AdminContext>, view: F) -> RouteHandler
where
    F: Fn(Arc<AdminContext>, HttpRequest, User) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AuthResult<HttpResponse>> + Send + 'static,
{
    let ctx = ctx.clone();
    Arc::new(move |request: HttpRequest| -> BoxFuture {
        match staff_user(&request) {
            Some(user) => Box::pin(view(ctx.clone(), request, user)),
            None => {
                let response = redirect_to_login(&request);
                Box::pin(async move { response })
            }
        }
    })
}

fn staff_user(request: &HttpRequest) -> Option<User> {
    request.user().filter(|u| u.is_active && u.is_staff).cloned()
}

fn redirect_to_login(request: &HttpRequest) -> AuthResult<HttpResponse> {
    let login_url = reverse(request, "login", &[])?;
    Ok(HttpResponseRedirect::new(&format!(
        "{login_url}?next={}",
        encode(&request.get_full_path())
    )))
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Reverses `admin:<name>`.
fn reverse(
    request: &HttpRequest,
    name: &str,
    kwargs: &[(&'static str, String)],
) -> AuthResult<String> {
    let kwargs: HashMap<&str, String> = kwargs.iter().cloned().collect();
    request
        .require_urlconf()?
        .reverse(&format!("{ADMIN_NAMESPACE}:{name}"), &kwargs)
}

async fn require_perm(ctx: &AdminContext, user: &User, perms: &[&str]) -> AuthResult<()> {
    for perm in perms {
        if ctx.backend.has_perm(user, &format!("{APP_LABEL}.{perm}")).await? {
            return Ok(());
        }
    }
    tracing::debug!(user_id = ?user.id, ?perms, "admin permission denied");
    Err(AuthError::PermissionDenied(
        "You don't have permission to view or edit this page.".into(),
    ))
}

fn form_errors(errors: &ValidationError) -> Value {
    json!(errors.field_errors)
}

/// A redirect target from `next`, limited to paths on this site.
fn safe_next(request: &HttpRequest) -> Option<String> {
    request
        .post()
        .get("next")
        .or_else(|| request.get().get("next"))
        .filter(|next| next.starts_with('/') && !next.starts_with("//"))
        .map(String::from)
}

fn form_page(title: &str, fields: Value, errors: Option<&ValidationError>) -> HttpResponse {
    JsonResponse::new(&json!({
        "title": title,
        "fields": fields,
        "errors": errors.map_or_else(|| json!({}), form_errors),
    }))
}

async fn load_user(ctx: &AdminContext, request: &HttpRequest) -> AuthResult<User> {
    let id = request
        .resolver_match()
        .ok_or_else(|| AuthError::NotFound("No URL match".into()))?
        .kwarg_i64("id")?;
    ctx.store
        .get_user(id)
        .await?
        .ok_or_else(|| {
            AuthError::NotFound(format!("User with ID \u{201c}{id}\u{201d} doesn't exist."))
        })
}

/// The permissions that can be granted to groups and users.
pub fn available_permissions() -> Vec<Permission> {
    let mut perms = default_permissions(APP_LABEL, "user");
    perms.extend(default_permissions(APP_LABEL, "group"));
    perms
}

// ── Site views ──────────────────────────────────────────────────────

async fn index(
    ctx: Arc<AdminContext>,
    request: HttpRequest,
    user: User,
) -> AuthResult<HttpResponse> {
    let apps: Vec<Value> = ctx
        .site
        .app_list()
        .into_iter()
        .map(|(app_label, admins)| {
            let models: Vec<Value> = admins
                .into_iter()
                .map(|admin| {
                    json!({
                        "model": admin.model_key(),
                        "name": admin.verbose_name_plural,
                        "changelist_url": reverse(&request, &admin.changelist_url_name(), &[]).ok(),
                        "add_url": reverse(&request, &admin.add_url_name(), &[]).ok(),
                    })
                })
                .collect();
            json!({ "app_label": app_label, "models": models })
        })
        .collect();

    Ok(JsonResponse::new(&json!({
        "site_header": ctx.site.header(),
        "user": user.email,
        "force_password_change": user.force_password_change,
        "apps": apps,
        "messages": messages::get_messages(&request).await,
    })))
}

async fn login_view(ctx: Arc<AdminContext>, mut request: HttpRequest) -> AuthResult<HttpResponse> {
    let next = safe_next(&request);
    if staff_user(&request).is_some() && request.method() == Method::GET {
        let target = match next {
            Some(next) => next,
            None => reverse(&request, "index", &[])?,
        };
        return Ok(HttpResponseRedirect::new(&target));
    }
    let fields = json!(AuthenticationForm::FIELDS);
    if request.method() != Method::POST {
        return Ok(form_page("Log in", fields, None));
    }

    let mut form = AuthenticationForm::new(request.post().clone());
    if !form.is_valid(ctx.backend.as_ref()).await? {
        return Ok(form_page("Log in", fields, Some(form.errors())));
    }
    let Some(mut user) = form.get_user().filter(|u| u.is_staff).cloned() else {
        let errors = ValidationError::default()
            .with_field_error(NON_FIELD_ERRORS, STAFF_LOGIN_REQUIRED);
        return Ok(form_page("Log in", fields, Some(&errors)));
    };

    login(&mut request, &user, ctx.backend.as_ref(), &ctx.secret_key).await?;
    user.last_login = Some(Utc::now());
    ctx.store.save_user(&mut user).await?;
    request.set_user(user);

    let target = match next {
        Some(next) => next,
        None => reverse(&request, "index", &[])?,
    };
    Ok(HttpResponseRedirect::new(&target))
}

async fn logout_view(
    _ctx: Arc<AdminContext>,
    mut request: HttpRequest,
) -> AuthResult<HttpResponse> {
    logout(&mut request).await?;
    Ok(JsonResponse::new(&json!({
        "title": "Logged out",
        "login_url": reverse(&request, "login", &[])?,
    })))
}

async fn password_change(
    ctx: Arc<AdminContext>,
    mut request: HttpRequest,
    user: User,
) -> AuthResult<HttpResponse> {
    let fields = json!(PasswordChangeForm::FIELDS);
    if request.method() != Method::POST {
        return Ok(form_page("Password change", fields, None));
    }

    let mut form = PasswordChangeForm::new(user, request.post().clone());
    if !form.is_valid(&ctx.hashers).await? {
        return Ok(form_page("Password change", fields, Some(form.errors())));
    }
    let user = form.save(ctx.store.as_ref(), &ctx.hashers).await?;
    update_session_auth_hash(&mut request, &user, &ctx.secret_key).await?;
    request.set_user(user);
    Ok(HttpResponseRedirect::new(&reverse(&request, "password_change_done", &[])?))
}

async fn password_change_done(
    _ctx: Arc<AdminContext>,
    _request: HttpRequest,
    _user: User,
) -> AuthResult<HttpResponse> {
    Ok(JsonResponse::new(&json!({
        "title": "Password change successful",
        "message": "Your password was changed.",
    })))
}

// ── Model views ─────────────────────────────────────────────────────

async fn changelist_page<T: AdminRecord>(
    request: &HttpRequest,
    admin: &ModelAdmin,
    records: &[T],
) -> HttpResponse {
    let changelist = ChangeList::build(admin, records, request.get(), Utc::now());
    JsonResponse::new(&json!({
        "changelist": changelist,
        "messages": messages::get_messages(request).await,
    }))
}

async fn user_changelist(
    ctx: Arc<AdminContext>,
    mut request: HttpRequest,
    user: User,
) -> AuthResult<HttpResponse> {
    let admin = ctx.user_admin()?;
    if request.method() != Method::POST {
        require_perm(&ctx, &user, &["view_user", "change_user"]).await?;
        let users = ctx.store.list_users().await?;
        return Ok(changelist_page(&request, &admin, &users).await);
    }

    require_perm(&ctx, &user, &["change_user"]).await?;
    let action = request.post().get("action").unwrap_or_default().to_string();
    let mut selected = Vec::new();
    for id in request.post().get_list(ACTION_CHECKBOX_NAME) {
        let id: i64 = id
            .parse()
            .map_err(|_| AuthError::BadRequest(format!("Invalid selection '{id}'")))?;
        if let Some(record) = ctx.store.get_user(id).await? {
            selected.push(record);
        }
    }

    let offered = admin.action_names.iter().any(|name| *name == action);
    let response = if offered {
        ctx.user_actions.run(&action, &mut request, selected).await?
    } else {
        None
    };
    match response {
        Some(response) => Ok(response),
        None => {
            messages::warning(&request, NO_ACTION_SELECTED).await?;
            Ok(HttpResponseRedirect::new(&request.get_full_path()))
        }
    }
}

async fn user_add(
    ctx: Arc<AdminContext>,
    request: HttpRequest,
    user: User,
) -> AuthResult<HttpResponse> {
    require_perm(&ctx, &user, &["add_user"]).await?;
    let admin = ctx.user_admin()?;
    let fields = json!({
        "fields": UserCreationForm::FIELDS,
        "fieldsets": admin.add_fieldsets,
    });
    if request.method() != Method::POST {
        return Ok(form_page("Add user", fields, None));
    }

    let mut form = UserCreationForm::new(request.post().clone());
    if !form.is_valid(ctx.store.as_ref()).await? {
        return Ok(form_page("Add user", fields, Some(form.errors())));
    }
    let created = form.save(&ctx.manager).await?;
    let id = created.id.ok_or_else(|| AuthError::DatabaseError("Saved user has no id".into()))?;
    messages::success(
        &request,
        format!(
            "The user \u{201c}{created}\u{201d} was added successfully. \
             You may edit it again below."
        ),
    )
    .await?;
    Ok(HttpResponseRedirect::new(&reverse(
        &request,
        &admin.url_name("change"),
        &[("id", id.to_string())],
    )?))
}

async fn user_change(
    ctx: Arc<AdminContext>,
    request: HttpRequest,
    user: User,
) -> AuthResult<HttpResponse> {
    let admin = ctx.user_admin()?;
    let original = load_user(&ctx, &request).await?;
    let id = original.id.unwrap_or_default();

    if request.method() != Method::POST {
        require_perm(&ctx, &user, &["view_user", "change_user"]).await?;
        return Ok(JsonResponse::new(&json!({
            "title": "Change user",
            "original": original.to_row(),
            "fields": UserChangeForm::FIELDS,
            "fieldsets": admin.fieldsets,
            "readonly_fields": admin.readonly_fields,
            "filter_horizontal": admin.filter_horizontal,
            "password_change_url": reverse(
                &request,
                &admin.url_name("password"),
                &[("id", id.to_string())],
            )?,
            "messages": messages::get_messages(&request).await,
        })));
    }

    require_perm(&ctx, &user, &["change_user"]).await?;
    let mut form = UserChangeForm::new(original, request.post().clone());
    if !form.is_valid(ctx.store.as_ref()).await? {
        return Ok(form_page("Change user", json!(UserChangeForm::FIELDS), Some(form.errors())));
    }
    let changed = form.save(ctx.store.as_ref()).await?;
    tracing::info!(user_id = id, changed_by = ?user.id, "user changed in admin");
    messages::success(
        &request,
        format!("The user \u{201c}{changed}\u{201d} was changed successfully."),
    )
    .await?;
    Ok(HttpResponseRedirect::new(&reverse(&request, &admin.changelist_url_name(), &[])?))
}

async fn user_password(
    ctx: Arc<AdminContext>,
    mut request: HttpRequest,
    user: User,
) -> AuthResult<HttpResponse> {
    require_perm(&ctx, &user, &["change_user"]).await?;
    let admin = ctx.user_admin()?;
    let target = load_user(&ctx, &request).await?;
    let title = format!("Change password: {}", target.email);
    let fields = json!(AdminPasswordChangeForm::FIELDS);
    if request.method() != Method::POST {
        return Ok(form_page(&title, fields, None));
    }

    let mut form = AdminPasswordChangeForm::new(target, request.post().clone());
    if !form.is_valid() {
        return Ok(form_page(&title, fields, Some(form.errors())));
    }
    let updated = form.save(ctx.store.as_ref(), &ctx.hashers).await?;
    if updated.id == user.id {
        update_session_auth_hash(&mut request, &updated, &ctx.secret_key).await?;
    }
    messages::success(&request, "Password changed successfully.").await?;
    let id = updated.id.unwrap_or_default();
    let change_url = reverse(&request, &admin.url_name("change"), &[("id", id.to_string())])?;
    Ok(HttpResponseRedirect::new(&change_url))
}

async fn group_changelist(
    ctx: Arc<AdminContext>,
    request: HttpRequest,
    user: User,
) -> AuthResult<HttpResponse> {
    require_perm(&ctx, &user, &["view_group", "change_group"]).await?;
    let admin = ctx.group_admin()?;
    let groups = ctx.store.list_groups().await?;
    Ok(changelist_page(&request, &admin, &groups).await)
}

async fn group_add(
    ctx: Arc<AdminContext>,
    request: HttpRequest,
    user: User,
) -> AuthResult<HttpResponse> {
    require_perm(&ctx, &user, &["add_group"]).await?;
    let admin = ctx.group_admin()?;
    let available = available_permissions();
    let fields = json!({
        "fieldsets": admin.fieldsets,
        "filter_horizontal": admin.filter_horizontal,
        "permissions": available
            .iter()
            .map(|p| json!({ "value": p.full_codename(), "label": p.name }))
            .collect::<Vec<_>>(),
    });
    if request.method() != Method::POST {
        return Ok(form_page("Add group", fields, None));
    }

    let mut errors = ValidationError::default();
    let name = request.post().get("name").unwrap_or_default().trim().to_string();
    if name.is_empty() {
        errors.add_field_error("name", "This field is required.");
    } else if name.chars().count() > GROUP_NAME_MAX_LENGTH {
        errors.add_field_error(
            "name",
            format!("Ensure this value has at most {GROUP_NAME_MAX_LENGTH} characters."),
        );
    } else if ctx.store.get_group_by_name(&name).await?.is_some() {
        errors.add_field_error("name", "Group with this Name already exists.");
    }

    let mut group = Group::new(name);
    for wanted in request.post().get_list("permissions") {
        match available.iter().find(|p| p.full_codename() == wanted) {
            Some(permission) => group.add_permission(permission.clone()),
            None => errors.add_field_error(
                "permissions",
                format!("Select a valid choice. {wanted} is not one of the available choices."),
            ),
        }
    }
    if !errors.is_empty() {
        return Ok(form_page("Add group", fields, Some(&errors)));
    }

    ctx.store.save_group(&mut group).await?;
    tracing::info!(group = %group.name, added_by = ?user.id, "group added in admin");
    messages::success(
        &request,
        format!("The group \u{201c}{group}\u{201d} was added successfully."),
    )
    .await?;
    Ok(HttpResponseRedirect::new(&reverse(&request, &admin.changelist_url_name(), &[])?))
}
