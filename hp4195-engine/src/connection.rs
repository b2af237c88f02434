//! Connection manager: owns the open session and performs the identity handshake.

use log::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{TransportError, WorkerError};
use crate::gpib::{Query, Setting};
use crate::transport::{Session, Transport};

/// Connection context of the worker.
///
/// Owned by the dispatcher and lent to one handler at a time, so the session
/// is never touched by two commands at once.
pub enum Connection<S> {
    Disconnected,
    Connected {
        resource_id: String,
        identity: String,
        session: S,
    },
}

impl<S> Default for Connection<S> {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl<S: Session> Connection<S> {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Connected { identity, .. } => Some(identity),
            Self::Disconnected => None,
        }
    }

    /// Open the configured resource and check that the instrument is the
    /// expected model. Any previous session is closed first.
    pub fn connect<T>(&mut self, transport: &mut T, config: &WorkerConfig) -> Result<(), WorkerError>
    where
        T: Transport<Session = S>,
    {
        self.close_session();
        info!("Opening {} ({:?} timeout)", config.resource_id, config.timeout);

        let mut session = transport.open(&config.resource_id, config.timeout)?;
        let response = match session.query(Query::Identity.as_str()) {
            Ok(response) => response,
            Err(e) => {
                close_quietly(session);
                return Err(e.into());
            }
        };
        let identity = response.lines().next().unwrap_or_default().trim().to_string();
        info!("Connected to: {}", identity);

        if !identity.contains(&config.device_tag) {
            warn!(
                "Device ID mismatch. Expected {}, got {}",
                config.device_tag, identity
            );
            close_quietly(session);
            return Err(WorkerError::IdentityMismatch {
                expected: config.device_tag.clone(),
                actual: identity,
            });
        }

        info!("Successfully found {}", config.device_tag);
        *self = Self::Connected {
            resource_id: config.resource_id.clone(),
            identity,
            session,
        };
        Ok(())
    }

    /// Close the session if one is open and release the resource manager.
    /// Always succeeds.
    pub fn disconnect<T>(&mut self, transport: &mut T)
    where
        T: Transport<Session = S>,
    {
        info!("Disconnecting");
        self.close_session();
        transport.release();
    }

    pub fn session_mut(&mut self) -> Result<&mut S, TransportError> {
        match self {
            Self::Connected { session, .. } => Ok(session),
            Self::Disconnected => Err(TransportError::NotConnected),
        }
    }

    pub fn write(&mut self, setting: Setting) -> Result<(), TransportError> {
        write(self.session_mut()?, setting)
    }

    pub fn query(&mut self, text: &str) -> Result<String, TransportError> {
        query(self.session_mut()?, text)
    }

    fn close_session(&mut self) {
        if let Self::Connected {
            resource_id,
            session,
            ..
        } = std::mem::take(self)
        {
            debug!("Closing {}", resource_id);
            close_quietly(session);
        }
    }
}

/// Logged write of one setting.
pub(crate) fn write<S: Session>(session: &mut S, setting: Setting) -> Result<(), TransportError> {
    let text = setting.to_string();
    info!("Sent \"{}\"", text);
    session.write(&text).inspect_err(|e| {
        error!("Write of \"{}\" failed: {}", text, e);
    })
}

/// Logged query.
pub(crate) fn query<S: Session>(session: &mut S, text: &str) -> Result<String, TransportError> {
    info!("Querying \"{}\"", text);
    match session.query(text) {
        Ok(response) => {
            debug!("Received {} characters", response.len());
            Ok(response)
        }
        Err(e) => {
            error!("Query \"{}\" failed: {}", text, e);
            Err(e)
        }
    }
}

fn close_quietly<S: Session>(session: S) {
    if let Err(e) = session.close() {
        warn!("Closing session failed: {}", e);
    }
}
