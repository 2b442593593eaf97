// Session lifecycle
// Teardown cascade and the session-ended signal consumed by the UI shell

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::auth::CredentialStore;

/// Display theme cached per signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    Light,
    Dark,
    System,
}

/// Per-user derived-preference cache
///
/// Cleared on teardown so the next session starts from defaults instead of a
/// stale user's preferences.
pub struct PreferenceCache {
    themes: Arc<DashMap<String, Theme>>,
}

impl PreferenceCache {
    pub fn new() -> Self {
        Self {
            themes: Arc::new(DashMap::new()),
        }
    }

    pub fn theme(&self, user_id: &str) -> Option<Theme> {
        self.themes.get(user_id).map(|entry| *entry)
    }

    pub fn set_theme(&self, user_id: &str, theme: Theme) {
        self.themes.insert(user_id.to_string(), theme);
    }

    pub fn clear(&self) {
        self.themes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }
}

impl Default for PreferenceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PreferenceCache {
    fn clone(&self) -> Self {
        Self {
            themes: Arc::clone(&self.themes),
        }
    }
}

/// Broadcast to the application when the session ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session is over. `redirect_to` is the sign-in route to navigate to,
    /// locale prefix preserved; None when the current route is already a
    /// sign-in route and navigating would loop.
    Ended { redirect_to: Option<String> },
}

type PathProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Owns the teardown cascade invoked when session recovery is impossible
///
/// Navigation-agnostic: the current path comes from an injected provider and
/// the redirect is emitted as an event for the UI shell to act on.
pub struct SessionController {
    store: CredentialStore,
    preferences: PreferenceCache,
    events: broadcast::Sender<SessionEvent>,
    current_path: PathProvider,
    sign_in_route: String,
    locales: Vec<String>,
    active: AtomicBool,
}

impl SessionController {
    pub fn new(
        store: CredentialStore,
        preferences: PreferenceCache,
        current_path: PathProvider,
        sign_in_route: String,
        locales: Vec<String>,
        initially_active: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            store,
            preferences,
            events,
            current_path,
            sign_in_route,
            locales,
            active: AtomicBool::new(initially_active),
        }
    }

    /// Subscribe to session events; the UI shell resets view state on Ended
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Re-arm the controller after a successful login
    pub fn mark_active(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn preferences(&self) -> &PreferenceCache {
        &self.preferences
    }

    /// Clear credentials and cached preferences and signal the UI shell
    ///
    /// Idempotent: invoking while already signed out does nothing.
    pub fn teardown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            tracing::debug!("Teardown requested while already signed out, ignoring");
            return;
        }

        self.store.clear();
        self.preferences.clear();

        let redirect_to =
            sign_in_target(&(self.current_path)(), &self.sign_in_route, &self.locales);
        tracing::info!("Session ended");

        // Nobody listening yet is fine; the shell may subscribe later
        let _ = self.events.send(SessionEvent::Ended { redirect_to });
    }
}

/// Sign-in route for the given path, preserving a locale prefix
///
/// `/de/decks/7` becomes `/de/sign-in`. Returns None when the path is already
/// a sign-in route.
pub fn sign_in_target(current_path: &str, sign_in_route: &str, locales: &[String]) -> Option<String> {
    let (prefix, rest) = split_locale_prefix(current_path, locales);
    if rest == sign_in_route || rest.starts_with(&format!("{}/", sign_in_route)) {
        return None;
    }
    Some(format!("{}{}", prefix, sign_in_route))
}

fn split_locale_prefix<'a>(path: &'a str, locales: &[String]) -> (&'a str, &'a str) {
    for locale in locales {
        let prefix_len = locale.len() + 1;
        if path.starts_with('/')
            && path[1..].starts_with(locale.as_str())
            && (path.len() == prefix_len || path[prefix_len..].starts_with('/'))
        {
            return path.split_at(prefix_len);
        }
    }
    ("", path)
}
