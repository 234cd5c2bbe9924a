//! Route table and navigation guard.
//!
//! [`guard`] is the pure allow/redirect decision made before every route
//! change. [`Router`] matches paths against the route table, runs the guard
//! against the live session, and handles the logout route's side effects.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use url::form_urlencoded;

use crate::auth::AuthSession;
use crate::events::AuthEvent;

/// Redirect hops before giving up on a navigation.
const MAX_REDIRECTS: usize = 5;

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";

/// Query parameter carrying the page to return to after login.
pub const REDIRECT_PARAM: &str = "redirect";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteMeta {
    pub requires_auth: bool,
    pub requires_no_auth: bool,
}

impl RouteMeta {
    const OPEN: Self = Self {
        requires_auth: false,
        requires_no_auth: false,
    };
    const AUTH: Self = Self {
        requires_auth: true,
        requires_no_auth: false,
    };
    const NO_AUTH: Self = Self {
        requires_auth: false,
        requires_no_auth: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteName {
    Home,
    Register,
    Login,
    Logout,
    NewProfile,
    ProfileDetail,
    Favourites,
    UserProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub name: RouteName,
    /// Path pattern; `:name` segments capture a parameter.
    pub pattern: &'static str,
    pub meta: RouteMeta,
}

pub const ROUTES: &[Route] = &[
    Route {
        name: RouteName::Home,
        pattern: "/",
        meta: RouteMeta::OPEN,
    },
    Route {
        name: RouteName::Register,
        pattern: "/register",
        meta: RouteMeta::NO_AUTH,
    },
    Route {
        name: RouteName::Login,
        pattern: "/login",
        meta: RouteMeta::NO_AUTH,
    },
    Route {
        name: RouteName::Logout,
        pattern: "/logout",
        meta: RouteMeta::AUTH,
    },
    Route {
        name: RouteName::NewProfile,
        pattern: "/profiles/new",
        meta: RouteMeta::AUTH,
    },
    Route {
        name: RouteName::ProfileDetail,
        pattern: "/profiles/:id",
        meta: RouteMeta::AUTH,
    },
    Route {
        name: RouteName::Favourites,
        pattern: "/profiles/favourites",
        meta: RouteMeta::AUTH,
    },
    Route {
        name: RouteName::UserProfile,
        pattern: "/profiles",
        meta: RouteMeta::AUTH,
    },
];

/// A path plus its decoded query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Split `"/a/b?x=1"` into path and decoded query. Fragments are dropped.
    pub fn parse(full_path: &str) -> Self {
        let without_fragment = full_path.split('#').next().unwrap_or_default();
        let (path, query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path, query),
            None => (without_fragment, ""),
        };
        let path = if path.is_empty() { HOME_PATH } else { path };
        Self {
            path: path.to_string(),
            query: form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path with the query string re-encoded.
    pub fn full_path(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{}", self.path, query)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect(Location),
}

/// Decide whether a navigation to `full_path` may go ahead.
///
/// - guest-only pages redirect signed-in users home;
/// - protected pages send guests to login, remembering where they were headed;
/// - everything else proceeds.
pub fn guard(meta: RouteMeta, authenticated: bool, full_path: &str) -> GuardDecision {
    if meta.requires_no_auth && authenticated {
        GuardDecision::Redirect(Location::new(HOME_PATH))
    } else if meta.requires_auth && !authenticated {
        GuardDecision::Redirect(Location::new(LOGIN_PATH).with_query(REDIRECT_PARAM, full_path))
    } else {
        GuardDecision::Proceed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: &'static Route,
    pub params: Vec<(&'static str, String)>,
}

impl RouteMatch {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Match `path` against the route table. Static segments outrank `:param`
/// segments, so `/profiles/new` never resolves as a profile id.
pub fn match_route(path: &str) -> Option<RouteMatch> {
    let wanted = segments(path);
    let mut best: Option<(usize, RouteMatch)> = None;

    for route in ROUTES {
        let pattern = segments(route.pattern);
        if pattern.len() != wanted.len() {
            continue;
        }

        let mut params = Vec::new();
        let mut static_segments = 0;
        let matched = pattern.into_iter().zip(&wanted).all(|(p, w)| match p.strip_prefix(':') {
            Some(name) => {
                params.push((name, (*w).to_string()));
                true
            }
            None if p == *w => {
                static_segments += 1;
                true
            }
            None => false,
        });

        if matched && best.as_ref().map_or(true, |(score, _)| static_segments > *score) {
            best = Some((static_segments, RouteMatch { route, params }));
        }
    }

    best.map(|(_, m)| m)
}

/// Where a navigation ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub route: RouteName,
    pub location: Location,
    pub params: Vec<(&'static str, String)>,
    /// The first location asked for, when a guard or redirect moved us.
    pub redirected_from: Option<Location>,
}

impl Resolution {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Resolved(Resolution),
    NotFound(Location),
    /// Redirects kept bouncing; the last location tried.
    RedirectLoop(Location),
}

pub struct Router {
    session: Arc<AuthSession>,
}

impl Router {
    pub fn new(session: Arc<AuthSession>) -> Self {
        Self { session }
    }

    /// Resolve a navigation to `full_path`, following guard redirects.
    pub fn navigate(&self, full_path: &str) -> Navigation {
        let mut location = Location::parse(full_path);
        let mut redirected_from: Option<Location> = None;

        for _ in 0..MAX_REDIRECTS {
            let Some(matched) = match_route(&location.path) else {
                return Navigation::NotFound(location);
            };

            // Logout is a redirect record: it acts before any guard runs
            let next = if matched.route.name == RouteName::Logout {
                self.session.end_session(AuthEvent::LoggedOut);
                GuardDecision::Redirect(Location::new(LOGIN_PATH))
            } else {
                guard(
                    matched.route.meta,
                    self.session.is_authenticated(),
                    &location.full_path(),
                )
            };

            match next {
                GuardDecision::Proceed => {
                    return Navigation::Resolved(Resolution {
                        route: matched.route.name,
                        location,
                        params: matched.params,
                        redirected_from,
                    });
                }
                GuardDecision::Redirect(target) => {
                    debug!(from = %location, to = %target, "Navigation redirected");
                    redirected_from.get_or_insert(location);
                    location = target;
                }
            }
        }

        Navigation::RedirectLoop(location)
    }

    /// Where to go after a successful login: the page the guard bounced the
    /// user from, or home.
    pub fn post_login_target(login: &Location) -> String {
        login
            .query_value(REDIRECT_PARAM)
            .filter(|target| target.starts_with('/') && !target.starts_with("//"))
            .unwrap_or(HOME_PATH)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::mock::{json, MockTransport};
    use crate::auth::credentials::{CredentialStore, REFRESH_TOKEN_KEY, TOKEN_KEY, USER_KEY};
    use crate::auth::MemoryCredentialStore;
    use crate::events::EventBus;
    use crate::store::GlobalStore;
    use serde_json::json;

    fn router(authenticated: bool) -> (Router, Arc<MemoryCredentialStore>, Arc<AuthSession>) {
        let credentials = Arc::new(MemoryCredentialStore::new());
        if authenticated {
            credentials.set(TOKEN_KEY, "T1").unwrap();
            credentials.set(REFRESH_TOKEN_KEY, "R1").unwrap();
            credentials
                .set(USER_KEY, r#"{"id":1,"username":"a","email":"a@example.com","name":"A"}"#)
                .unwrap();
        }
        let session = Arc::new(AuthSession::new(
            Arc::new(MockTransport::new(|_| async { json(200, json!({})) })),
            credentials.clone(),
            GlobalStore::new(),
            EventBus::new(),
        ));
        (Router::new(session.clone()), credentials, session)
    }

    fn resolved(navigation: Navigation) -> Resolution {
        match navigation {
            Navigation::Resolved(resolution) => resolution,
            other => panic!("expected a resolved navigation, got {:?}", other),
        }
    }

    // -------------------------------------------------------------------------
    // Guard
    // -------------------------------------------------------------------------

    #[test]
    fn test_guard_protected_routes_redirect_guests() {
        for route in ROUTES.iter().filter(|r| r.meta.requires_auth) {
            let path = route.pattern.replace(":id", "3");
            match guard(route.meta, false, &path) {
                GuardDecision::Redirect(target) => {
                    assert_eq!(target.path, LOGIN_PATH);
                    assert_eq!(target.query_value(REDIRECT_PARAM), Some(path.as_str()));
                }
                GuardDecision::Proceed => panic!("{} should require auth", route.pattern),
            }
            assert_eq!(guard(route.meta, true, &path), GuardDecision::Proceed);
        }
    }

    #[test]
    fn test_guard_guest_routes_redirect_users_home() {
        for route in ROUTES.iter().filter(|r| r.meta.requires_no_auth) {
            assert_eq!(
                guard(route.meta, true, route.pattern),
                GuardDecision::Redirect(Location::new(HOME_PATH))
            );
            assert_eq!(guard(route.meta, false, route.pattern), GuardDecision::Proceed);
        }
    }

    #[test]
    fn test_guard_open_routes_always_proceed() {
        assert_eq!(guard(RouteMeta::default(), true, "/"), GuardDecision::Proceed);
        assert_eq!(guard(RouteMeta::default(), false, "/"), GuardDecision::Proceed);
    }

    #[test]
    fn test_redirect_query_is_encoded() {
        let decision = guard(RouteMeta::AUTH, false, "/profiles/3?tab=matches");
        let GuardDecision::Redirect(target) = decision else {
            panic!("expected redirect");
        };
        assert_eq!(
            target.full_path(),
            "/login?redirect=%2Fprofiles%2F3%3Ftab%3Dmatches"
        );
        let reparsed = Location::parse(&target.full_path());
        assert_eq!(reparsed.query_value(REDIRECT_PARAM), Some("/profiles/3?tab=matches"));
    }

    // -------------------------------------------------------------------------
    // Matching
    // -------------------------------------------------------------------------

    #[test]
    fn test_static_segments_win() {
        assert_eq!(match_route("/profiles/new").unwrap().route.name, RouteName::NewProfile);
        assert_eq!(
            match_route("/profiles/favourites").unwrap().route.name,
            RouteName::Favourites
        );

        let detail = match_route("/profiles/42").unwrap();
        assert_eq!(detail.route.name, RouteName::ProfileDetail);
        assert_eq!(detail.param("id"), Some("42"));

        assert_eq!(match_route("/profiles/").unwrap().route.name, RouteName::UserProfile);
        assert_eq!(match_route("/").unwrap().route.name, RouteName::Home);
        assert!(match_route("/nowhere").is_none());
        assert!(match_route("/profiles/1/extra").is_none());
    }

    #[test]
    fn test_location_parse() {
        let location = Location::parse("/search?name=dan+smith&sex=Male#top");
        assert_eq!(location.path, "/search");
        assert_eq!(location.query_value("name"), Some("dan smith"));
        assert_eq!(location.query_value("sex"), Some("Male"));
        assert_eq!(Location::parse("").path, "/");
        assert_eq!(Location::parse("?x=1").path, "/");
    }

    // -------------------------------------------------------------------------
    // Router
    // -------------------------------------------------------------------------

    #[test]
    fn test_navigate_guest_to_protected() {
        let (router, _, _) = router(false);
        let resolution = resolved(router.navigate("/profiles/7"));
        assert_eq!(resolution.route, RouteName::Login);
        assert_eq!(resolution.location.full_path(), "/login?redirect=%2Fprofiles%2F7");
        assert_eq!(resolution.redirected_from.map(|l| l.path), Some("/profiles/7".to_string()));
        assert_eq!(Router::post_login_target(&resolution.location), "/profiles/7");
    }

    #[test]
    fn test_navigate_user_to_login_goes_home() {
        let (router, _, _) = router(true);
        let resolution = resolved(router.navigate("/login"));
        assert_eq!(resolution.route, RouteName::Home);
        assert_eq!(resolution.location.full_path(), "/");
    }

    #[test]
    fn test_navigate_user_to_protected_proceeds() {
        let (router, _, _) = router(true);
        let resolution = resolved(router.navigate("/profiles/7"));
        assert_eq!(resolution.route, RouteName::ProfileDetail);
        assert_eq!(resolution.param("id"), Some("7"));
        assert!(resolution.redirected_from.is_none());
    }

    #[test]
    fn test_logout_route_clears_and_notifies() {
        let (router, credentials, session) = router(true);
        let mut events = session.events().subscribe();

        let resolution = resolved(router.navigate("/logout"));
        assert_eq!(resolution.route, RouteName::Login);
        assert_eq!(resolution.location.full_path(), "/login");

        assert_eq!(credentials.get(TOKEN_KEY), None);
        assert_eq!(credentials.get(REFRESH_TOKEN_KEY), None);
        assert_eq!(credentials.get(USER_KEY), None);
        assert!(!session.store().is_logged_in());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::LoggedOut);
    }

    #[test]
    fn test_logout_route_as_guest_lands_on_plain_login() {
        let (router, _, _) = router(false);
        let resolution = resolved(router.navigate("/logout"));
        assert_eq!(resolution.location.full_path(), "/login");
    }

    #[test]
    fn test_unknown_path() {
        let (router, _, _) = router(true);
        assert_eq!(
            router.navigate("/nowhere?x=1"),
            Navigation::NotFound(Location::parse("/nowhere?x=1"))
        );
    }

    #[test]
    fn test_post_login_target_rejects_offsite() {
        let login = Location::new(LOGIN_PATH).with_query(REDIRECT_PARAM, "https://evil.example");
        assert_eq!(Router::post_login_target(&login), "/");
        let protocol_relative =
            Location::new(LOGIN_PATH).with_query(REDIRECT_PARAM, "//evil.example");
        assert_eq!(Router::post_login_target(&protocol_relative), "/");
        assert_eq!(Router::post_login_target(&Location::new(LOGIN_PATH)), "/");
    }
}
