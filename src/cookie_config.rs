//! Defines the configuration for the session cookie.
use recipe_backend_core::{session_store::DEFAULT_SESSION_TTL, Token};
use time::Duration;
use tower_cookies::{cookie::SameSite, Cookie};

/// The default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "SESSION_ID";

/// Defines the configuration for the session cookie.
///
/// The cookie is always `HttpOnly`: it carries a bearer token that scripts
/// have no business reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    /// The name of the cookie.
    pub name: String,

    /// Specifies the SameSite attribute of the cookie.
    ///
    /// The default, `SameSite::Lax`, sends the cookie on same-site requests
    /// and on top-level cross-site navigations, so links into the site keep
    /// the visitor signed in.
    pub same_site: SameSite,

    /// Specifies the maximum age of the cookie.
    ///
    /// Defaults to the lifetime of a session in the cache.
    pub max_age: Duration,

    /// Indicates whether the cookie should only be transmitted over secure
    /// (HTTPS) connections.
    pub secure: bool,

    /// Specifies the path for which the cookie is valid.
    pub path: String,

    /// Specifies the domain for which the cookie is valid.
    pub domain: Option<String>,
}

impl CookieConfig {
    /// Create the cookie carrying `token`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use recipe_backend::{recipe_backend_core::Token, CookieConfig};
    ///
    /// let token = Token::generate();
    /// let cookie = CookieConfig::default().build_cookie(&token);
    /// assert_eq!(cookie.name(), "SESSION_ID");
    /// assert_eq!(cookie.value(), token.to_string());
    /// ```
    pub fn build_cookie(&self, token: &Token) -> Cookie<'static> {
        let mut cookie_builder = Cookie::build((self.name.clone(), token.to_string()))
            .http_only(true)
            .same_site(self.same_site)
            .secure(self.secure)
            .path(self.path.clone())
            .max_age(self.max_age);

        if let Some(domain) = &self.domain {
            cookie_builder = cookie_builder.domain(domain.clone());
        }

        cookie_builder.build()
    }

    /// Create a cookie that matches the session cookie's name, path and
    /// domain, suitable for handing to [`Cookies::remove`].
    ///
    /// Path and domain must be set for the browser to treat the removal
    /// cookie as the same cookie.
    ///
    /// [`Cookies::remove`]: tower_cookies::Cookies::remove
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie_builder = Cookie::build((self.name.clone(), ""))
            .http_only(true)
            .same_site(self.same_site)
            .secure(self.secure)
            .path(self.path.clone());

        if let Some(domain) = &self.domain {
            cookie_builder = cookie_builder.domain(domain.clone());
        }

        cookie_builder.build()
    }

    /// Configures the name of the cookie.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use recipe_backend::CookieConfig;
    ///
    /// let cookie_config = CookieConfig::default().with_name("my.sid");
    /// assert_eq!(cookie_config.name, "my.sid");
    /// ```
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Configures the `"SameSite"` attribute of the cookie.
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Configures the `"Max-Age"` attribute of the cookie.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Configures the `"Secure"` attribute of the cookie.
    ///
    /// Only development setups served over plain HTTP should turn this off.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Configures the `"Path"` attribute of the cookie.
    pub fn with_path(mut self, path: String) -> Self {
        self.path = path;
        self
    }

    /// Configures the `"Domain"` attribute of the cookie.
    pub fn with_domain(mut self, domain: String) -> Self {
        self.domain = Some(domain);
        self
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: String::from(DEFAULT_COOKIE_NAME),
            same_site: SameSite::Lax,
            max_age: Duration::seconds(DEFAULT_SESSION_TTL.as_secs() as i64),
            secure: true,
            path: String::from("/"),
            domain: None,
        }
    }
}
