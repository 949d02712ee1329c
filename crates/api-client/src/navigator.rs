//! Browser-side effects the client triggers on inactive accounts

use tracing::info;

/// Redirect and cookie hooks of the hosting UI.
pub trait Navigator: Send + Sync {
    /// Path the user is currently on, used to pick the login page.
    fn current_path(&self) -> String;

    fn redirect(&self, location: &str);

    /// Apply a `Set-Cookie` value. Hosts without cookies ignore it.
    fn set_cookie(&self, _cookie: &str) {}
}

/// Login pages for the two areas of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRoutes {
    /// Paths under this prefix belong to the member-facing area.
    pub user_area_prefix: String,
    pub user_login: String,
    pub admin_login: String,
}

impl Default for LoginRoutes {
    fn default() -> Self {
        Self {
            user_area_prefix: "/user".into(),
            user_login: "/user/login".into(),
            admin_login: "/login".into(),
        }
    }
}

impl LoginRoutes {
    /// Login location carrying the `account_inactive` marker for `current_path`.
    pub fn inactive_account_redirect(&self, current_path: &str) -> String {
        let prefix = self.user_area_prefix.trim_end_matches('/');
        let in_user_area = current_path == prefix
            || current_path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
        let login = if in_user_area {
            &self.user_login
        } else {
            &self.admin_login
        };
        format!("{login}?error=account_inactive")
    }
}

/// Navigator for headless hosts: logs instead of navigating.
#[derive(Debug, Clone)]
pub struct LoggingNavigator {
    path: String,
}

impl LoggingNavigator {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for LoggingNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for LoggingNavigator {
    fn current_path(&self) -> String {
        self.path.clone()
    }

    fn redirect(&self, location: &str) {
        info!(location, "redirect requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_area_paths_go_to_user_login() {
        let routes = LoginRoutes::default();
        assert_eq!(
            routes.inactive_account_redirect("/user/dashboard"),
            "/user/login?error=account_inactive"
        );
        assert_eq!(
            routes.inactive_account_redirect("/user"),
            "/user/login?error=account_inactive"
        );
    }

    #[test]
    fn other_paths_go_to_admin_login() {
        let routes = LoginRoutes::default();
        for path in ["/", "/dashboard/users", "/users", "/username"] {
            assert_eq!(
                routes.inactive_account_redirect(path),
                "/login?error=account_inactive",
                "path {path}"
            );
        }
    }

    #[test]
    fn custom_routes() {
        let routes = LoginRoutes {
            user_area_prefix: "/member/".into(),
            user_login: "/member/sign-in".into(),
            admin_login: "/admin/sign-in".into(),
        };
        assert_eq!(
            routes.inactive_account_redirect("/member/posts"),
            "/member/sign-in?error=account_inactive"
        );
        assert_eq!(
            routes.inactive_account_redirect("/admin"),
            "/admin/sign-in?error=account_inactive"
        );
    }

    #[test]
    fn logging_navigator_reports_configured_path() {
        assert_eq!(LoggingNavigator::default().current_path(), "/");
        assert_eq!(LoggingNavigator::new("/user/home").current_path(), "/user/home");
    }
}
