use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::error::{AuthError, Error, Result, describe_remote_error};
use crate::transport::{ApiRequest, ApiResponse, Auth, Method, Transport};

/// Shared, replaceable bearer token.
///
/// Every clone points at the same slot, so a login performed through one
/// handle is seen by requests issued through any other.
#[derive(Clone, Default)]
pub struct CredentialCell(Arc<RwLock<Option<String>>>);

impl CredentialCell {
    pub fn new(token: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(token)))
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_set(&self) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl fmt::Debug for CredentialCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialCell")
            .field(&if self.is_set() { "***" } else { "<empty>" })
            .finish()
    }
}

#[derive(Debug, serde::Deserialize)]
struct LoginReply {
    token: String,
}

/// Authenticated access to the service.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
    credential: CredentialCell,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session with no credential; call [`Session::login`] next.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            credential: CredentialCell::default(),
        }
    }

    /// Creates a session around a token obtained elsewhere.
    pub fn with_token(transport: Arc<dyn Transport>, token: impl Into<String>) -> Self {
        Self {
            transport,
            credential: CredentialCell::new(Some(token.into())),
        }
    }

    pub fn credential(&self) -> &CredentialCell {
        &self.credential
    }

    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        let request = ApiRequest::post("login").with_auth(Auth::Basic {
            username: username.to_string(),
            password: password.to_string(),
        });
        let resp = self.transport.execute(&request)?;
        if resp.status != 200 {
            let status = resp.status;
            let body = resp.text().unwrap_or_default();
            return Err(AuthError::LoginFailed {
                status,
                message: describe_remote_error(status, &body),
            }
            .into());
        }

        let reply: LoginReply = resp.json("reading login reply")?;
        self.credential.set(reply.token);
        log::info!("logged in as {}", username);
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        let resp = self.request(Method::Post, "logout", None)?;
        if resp.status != 204 {
            return Err(AuthError::LogoutFailed {
                status: resp.status,
            }
            .into());
        }
        self.credential.clear();
        log::info!("logged out");
        Ok(())
    }

    /// Sends a request carrying the credential current at call time.
    pub fn request(&self, method: Method, path: &str, json: Option<Value>) -> Result<ApiResponse> {
        let token = self.credential.get().ok_or(AuthError::NotLoggedIn)?;
        let request = ApiRequest {
            method,
            path: path.to_string(),
            auth: Auth::Bearer(token),
            json,
        };
        Ok(self.transport.execute(&request)?)
    }

    pub fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::Get, path, None)
    }

    /// GET that insists on a 2xx JSON reply.
    pub fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let resp = self.get(path)?;
        if !resp.is_success() {
            let status = resp.status;
            let body = resp.text().unwrap_or_default();
            return Err(Error::RequestFailed {
                context: context.to_string(),
                status,
                message: describe_remote_error(status, &body),
            });
        }
        resp.json(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_cell_is_shared_between_clones() {
        let cell = CredentialCell::default();
        let other = cell.clone();
        assert!(!other.is_set());
        cell.set("abc");
        assert_eq!(other.get().as_deref(), Some("abc"));
        other.clear();
        assert!(cell.get().is_none());
    }

    #[test]
    fn credential_debug_hides_token() {
        let cell = CredentialCell::new(Some("secret".into()));
        assert!(!format!("{cell:?}").contains("secret"));
    }
}
