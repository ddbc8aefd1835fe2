//! Scoped install session
//!
//! Opening a [`PrivilegedSession`] opens a host session, optionally
//! authenticates, and grants the install privileges. Dropping it revokes
//! whatever was granted and closes the session, on every exit path.

use hotswap_kernel::{AuthContext, HostResult, Privilege};
use tracing::debug;

pub struct PrivilegedSession<'a> {
    auth: &'a dyn AuthContext,
    granted: Vec<Privilege>,
}

impl<'a> PrivilegedSession<'a> {
    pub fn open(auth: &'a dyn AuthContext, credentials: Option<(&str, &str)>) -> HostResult<Self> {
        auth.open_session();
        let mut session = Self {
            auth,
            granted: Vec::with_capacity(Privilege::INSTALL.len()),
        };

        if let Some((username, password)) = credentials {
            debug!("Authenticating install session as {}", username);
            auth.authenticate(username, password)?;
        }

        for privilege in Privilege::INSTALL {
            auth.add_proxy_privilege(privilege);
            session.granted.push(privilege);
        }

        Ok(session)
    }

    pub fn privileges(&self) -> &[Privilege] {
        &self.granted
    }
}

impl Drop for PrivilegedSession<'_> {
    fn drop(&mut self) {
        for privilege in self.granted.drain(..) {
            self.auth.remove_proxy_privilege(privilege);
        }
        self.auth.clear_session();
        self.auth.close_session();
    }
}
