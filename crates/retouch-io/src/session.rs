//! Authentication and device context shared by the client and the
//! login flow.

use std::cell::{Cell, RefCell};

use serde::{Deserialize, Serialize};

/// Device metadata sent with every request as `X-Device-Info`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Operating system or host platform (e.g. `"ios"`, `"linux"`).
    pub platform: String,
    /// Host application or OS version.
    pub version: String,
    /// Device model.
    pub model: String,
}

impl DeviceInfo {
    /// Describe the machine this process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self {
            platform: std::env::consts::OS.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            model: std::env::consts::ARCH.to_owned(),
        }
    }

    /// Header value: compact JSON `{"platform","version","model"}`.
    #[must_use]
    pub fn header_value(&self) -> String {
        serde_json::json!({
            "platform": self.platform,
            "version": self.version,
            "model": self.model,
        })
        .to_string()
    }
}

/// Bearer token and device descriptor for the current user.
///
/// Interior mutability lets the client invalidate the session on a 401
/// through a shared `Rc<Session>` handle.
#[derive(Debug, Default)]
pub struct Session {
    token: RefCell<Option<String>>,
    device: RefCell<Option<DeviceInfo>>,
    reauth: Cell<bool>,
}

impl Session {
    /// An anonymous session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session already holding `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(token);
        session
    }

    /// Store a token after a successful login.
    pub fn sign_in(&self, token: impl Into<String>) {
        *self.token.borrow_mut() = Some(token.into());
        self.reauth.set(false);
    }

    /// Record the device metadata to send with requests.
    pub fn set_device(&self, device: DeviceInfo) {
        *self.device.borrow_mut() = Some(device);
    }

    /// Current token, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    /// Current device metadata, if set.
    #[must_use]
    pub fn device(&self) -> Option<DeviceInfo> {
        self.device.borrow().clone()
    }

    /// Whether a token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.borrow().is_some()
    }

    /// Drop the token because the server rejected it. The user has to
    /// sign in again.
    pub fn invalidate(&self) {
        if self.token.borrow_mut().take().is_some() {
            tracing::warn!("session token rejected by server; sign-in required");
        }
        self.reauth.set(true);
    }

    /// Whether the server rejected the last token.
    #[must_use]
    pub fn needs_reauthentication(&self) -> bool {
        self.reauth.get()
    }

    /// Sign out: forget token and device metadata.
    pub fn clear(&self) {
        self.token.borrow_mut().take();
        self.device.borrow_mut().take();
        self.reauth.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_and_invalidate() {
        let session = Session::new();
        assert!(!session.is_authenticated());

        session.sign_in("abc");
        assert_eq!(session.token().as_deref(), Some("abc"));
        assert!(!session.needs_reauthentication());

        session.invalidate();
        assert!(!session.is_authenticated());
        assert!(session.needs_reauthentication());

        session.sign_in("def");
        assert!(!session.needs_reauthentication());
    }

    #[test]
    fn clear_forgets_everything() {
        let session = Session::with_token("t");
        session.set_device(DeviceInfo::current());
        session.clear();
        assert!(session.token().is_none());
        assert!(session.device().is_none());
    }

    #[test]
    fn device_header_is_compact_json() {
        let device = DeviceInfo {
            platform: "ios".into(),
            version: "8.0.5".into(),
            model: "iPhone 13".into(),
        };
        let parsed: serde_json::Value = serde_json::from_str(&device.header_value()).unwrap_or_default();
        assert_eq!(parsed["platform"], "ios");
        assert_eq!(parsed["version"], "8.0.5");
        assert_eq!(parsed["model"], "iPhone 13");
    }
}
