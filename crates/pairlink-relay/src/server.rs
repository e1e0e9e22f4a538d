//! Connection-pairing relay state machine.
//!
//! Each live connection moves through
//! `Unauthenticated -> Authenticated(role, pairing) -> Disconnected`.
//! Authenticated connections are matched by pairing identifier, one per
//! role. Once both roles are present each side receives the other's nonce,
//! and from then on content frames are forwarded verbatim to the counterpart.
//!
//! All state sits behind a single lock. Token validation is the only step that
//! suspends, and it runs with the lock released; its result is applied only if
//! the originating connection is still tracked.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use pairlink_common::{AuthMessage, ProtocolError, Result, Role, ServerMessage, ValidatedToken};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::classifier::{self, MessageHandler};
use crate::validator::TokenValidator;

/// A live transport connection, owned by the transport layer.
///
/// Both methods must return immediately; delivery is fire-and-forget.
pub trait Connection: Send + Sync {
    /// Queue a text frame. Returns `false` if it could not be queued.
    fn send(&self, text: String) -> bool;

    /// Ask the transport to close this connection.
    fn disconnect(&self);
}

/// Handle assigned to a connection when it registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthState {
    Unauthenticated,
    Authenticated {
        role: Role,
        pairing_id: String,
        nonce: String,
    },
}

struct ConnectionRecord {
    conn: Arc<dyn Connection>,
    auth: AuthState,
}

/// The two halves of one pairing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PairingSlot {
    initiator: Option<ConnectionId>,
    responder: Option<ConnectionId>,
}

impl PairingSlot {
    fn get(&self, role: Role) -> Option<ConnectionId> {
        match role {
            Role::Initiator => self.initiator,
            Role::Responder => self.responder,
        }
    }

    fn set(&mut self, role: Role, id: Option<ConnectionId>) {
        match role {
            Role::Initiator => self.initiator = id,
            Role::Responder => self.responder = id,
        }
    }

    fn is_empty(&self) -> bool {
        self.initiator.is_none() && self.responder.is_none()
    }
}

#[derive(Default)]
struct RelayState {
    next_id: u64,
    connections: HashMap<ConnectionId, ConnectionRecord>,
    /// Transport handle identity -> id, to refuse double registration.
    handles: HashMap<usize, ConnectionId>,
    slots: HashMap<String, PairingSlot>,
}

impl RelayState {
    fn send_to(&self, id: ConnectionId, message: &ServerMessage) {
        let Some(record) = self.connections.get(&id) else {
            return;
        };
        let json = match message.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to encode {:?} for {}: {}", message, id, err);
                return;
            }
        };
        if !record.conn.send(json) {
            warn!("failed to queue {:?} for {}", message, id);
        }
    }

    fn nonce_of(&self, id: ConnectionId) -> Option<&str> {
        match &self.connections.get(&id)?.auth {
            AuthState::Authenticated { nonce, .. } => Some(nonce),
            AuthState::Unauthenticated => None,
        }
    }
}

fn handle_key(conn: &Arc<dyn Connection>) -> usize {
    Arc::as_ptr(conn) as *const () as usize
}

/// Occupancy of a pairing, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingStatus {
    pub initiator: Option<ConnectionId>,
    pub responder: Option<ConnectionId>,
}

impl PairingStatus {
    pub fn is_paired(&self) -> bool {
        self.initiator.is_some() && self.responder.is_some()
    }
}

/// The relay. Cheap to share behind an `Arc`.
pub struct RelayServer {
    state: RwLock<RelayState>,
    validator: Arc<dyn TokenValidator>,
}

impl RelayServer {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            state: RwLock::new(RelayState::default()),
            validator,
        }
    }

    /// Track a new connection in the unauthenticated state.
    pub async fn on_connection(
        &self,
        conn: Arc<dyn Connection>,
    ) -> std::result::Result<ConnectionId, ProtocolError> {
        let key = handle_key(&conn);
        let mut state = self.state.write().await;
        if state.handles.contains_key(&key) {
            return Err(ProtocolError::AlreadyRegistered);
        }

        state.next_id += 1;
        let id = ConnectionId(state.next_id);
        state.handles.insert(key, id);
        state.connections.insert(
            id,
            ConnectionRecord {
                conn,
                auth: AuthState::Unauthenticated,
            },
        );
        debug!("registered {}", id);
        Ok(id)
    }

    /// Classify a raw frame and route it to the auth or content path.
    pub async fn on_message(&self, id: ConnectionId, raw: &str) -> Result<()> {
        let mut inbound = Inbound { server: self, id };
        classifier::dispatch(raw, &mut inbound)?.await
    }

    /// Authenticate `id` with the validator and place it in its pairing.
    pub async fn on_auth_message(&self, id: ConnectionId, auth: AuthMessage) -> Result<()> {
        {
            let state = self.state.read().await;
            let record = state
                .connections
                .get(&id)
                .ok_or(ProtocolError::UnknownConnection)?;
            if record.auth != AuthState::Unauthenticated {
                record.conn.disconnect();
                return Err(ProtocolError::AlreadyAuthenticated.into());
            }
        }

        let claims = self.validator.validate(&auth.token).await.map_err(|e| {
            debug!("token rejected for {}: {}", id, e);
            e
        })?;

        self.complete_auth(id, auth.nonce, claims).await
    }

    async fn complete_auth(
        &self,
        id: ConnectionId,
        nonce: String,
        claims: ValidatedToken,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        let conn = match state.connections.get(&id) {
            Some(record) if record.auth == AuthState::Unauthenticated => record.conn.clone(),
            Some(record) => {
                record.conn.disconnect();
                return Err(ProtocolError::AlreadyAuthenticated.into());
            }
            None => {
                debug!("discarding validation result for departed {}", id);
                return Ok(());
            }
        };

        let ValidatedToken {
            pairing_id,
            role,
            expiry,
        } = claims;

        let slot = state.slots.entry(pairing_id.clone()).or_default();
        if slot.get(role).is_some() {
            state.connections.remove(&id);
            state.handles.remove(&handle_key(&conn));
            conn.disconnect();
            warn!("{} rejected: {} already connected to {}", id, role, pairing_id);
            return Err(ProtocolError::RoleAlreadyConnected { pairing_id, role }.into());
        }
        slot.set(role, Some(id));
        let peer = slot.get(role.opposite());

        if let Some(record) = state.connections.get_mut(&id) {
            record.auth = AuthState::Authenticated {
                role,
                pairing_id: pairing_id.clone(),
                nonce,
            };
        }
        info!(
            "{} authenticated as {} for pairing {} (expiry {})",
            id, role, pairing_id, expiry
        );

        if let Some(peer) = peer {
            let own_nonce = state.nonce_of(id).map(str::to_owned);
            let peer_nonce = state.nonce_of(peer).map(str::to_owned);
            if let (Some(own_nonce), Some(peer_nonce)) = (own_nonce, peer_nonce) {
                state.send_to(id, &ServerMessage::PeerConnect { nonce: peer_nonce });
                state.send_to(peer, &ServerMessage::PeerConnect { nonce: own_nonce });
                info!("pairing {} complete ({} <-> {})", pairing_id, id, peer);
            }
        }

        Ok(())
    }

    /// Forward a content frame to the counterpart, verbatim.
    ///
    /// Frames sent while no counterpart is connected are dropped.
    pub async fn on_content_message(&self, id: ConnectionId, raw: &str) -> Result<()> {
        let state = self.state.read().await;
        let record = state
            .connections
            .get(&id)
            .ok_or(ProtocolError::UnknownConnection)?;

        let (role, pairing_id) = match &record.auth {
            AuthState::Authenticated {
                role, pairing_id, ..
            } => (*role, pairing_id),
            AuthState::Unauthenticated => {
                record.conn.disconnect();
                warn!("{} sent content before authenticating", id);
                return Err(ProtocolError::NotAuthenticated.into());
            }
        };

        let peer = state
            .slots
            .get(pairing_id)
            .and_then(|slot| slot.get(role.opposite()));
        let Some(peer) = peer.and_then(|peer| state.connections.get(&peer)) else {
            debug!("no peer for {} in {}, dropping frame", id, pairing_id);
            return Ok(());
        };

        if !peer.conn.send(raw.to_string()) {
            warn!("failed to queue relayed frame from {} in {}", id, pairing_id);
        } else {
            debug!("relayed {} bytes from {} in {}", raw.len(), id, pairing_id);
        }
        Ok(())
    }

    /// Forget `id`, vacate its pairing half and tell the remaining peer.
    pub async fn on_disconnection(&self, id: ConnectionId) {
        let mut state = self.state.write().await;
        let Some(record) = state.connections.remove(&id) else {
            return;
        };
        state.handles.remove(&handle_key(&record.conn));

        let AuthState::Authenticated {
            role, pairing_id, ..
        } = record.auth
        else {
            debug!("unauthenticated {} disconnected", id);
            return;
        };

        let Some(slot) = state.slots.get_mut(&pairing_id) else {
            return;
        };
        if slot.get(role) == Some(id) {
            slot.set(role, None);
        }
        let peer = slot.get(role.opposite());
        let empty = slot.is_empty();

        if empty {
            state.slots.remove(&pairing_id);
        }
        if let Some(peer) = peer {
            state.send_to(peer, &ServerMessage::PeerDisconnect);
        }
        info!("{} ({}) left pairing {}", id, role, pairing_id);
    }

    /// Number of tracked connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Number of pairings with at least one occupant.
    pub async fn pairing_count(&self) -> usize {
        self.state.read().await.slots.len()
    }

    pub async fn pairing_status(&self, pairing_id: &str) -> Option<PairingStatus> {
        let state = self.state.read().await;
        state.slots.get(pairing_id).map(|slot| PairingStatus {
            initiator: slot.initiator,
            responder: slot.responder,
        })
    }

    pub async fn is_authenticated(&self, id: ConnectionId) -> bool {
        let state = self.state.read().await;
        matches!(
            state.connections.get(&id).map(|r| &r.auth),
            Some(AuthState::Authenticated { .. })
        )
    }
}

/// Routes a classified frame back into the server for one connection.
struct Inbound<'a> {
    server: &'a RelayServer,
    id: ConnectionId,
}

impl<'a> MessageHandler for Inbound<'a> {
    type Output = BoxFuture<'a, Result<()>>;

    fn handle_auth_message(&mut self, auth: AuthMessage) -> Self::Output {
        let (server, id) = (self.server, self.id);
        Box::pin(async move { server.on_auth_message(id, auth).await })
    }

    fn handle_content_message(&mut self, raw: String) -> Self::Output {
        let (server, id) = (self.server, self.id);
        Box::pin(async move { server.on_content_message(id, &raw).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::StaticTokenValidator;
    use pairlink_common::Error;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestConn {
        sent: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl Connection for TestConn {
        fn send(&self, text: String) -> bool {
            self.sent.lock().unwrap().push(text);
            true
        }

        fn disconnect(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn server() -> RelayServer {
        let validator = StaticTokenValidator::new().with_token(
            "tok-i",
            ValidatedToken {
                pairing_id: "P1".into(),
                role: Role::Initiator,
                expiry: 0,
            },
        );
        RelayServer::new(Arc::new(validator))
    }

    #[test]
    fn test_slot_halves() {
        let mut slot = PairingSlot::default();
        assert!(slot.is_empty());
        slot.set(Role::Responder, Some(ConnectionId(3)));
        assert_eq!(slot.get(Role::Responder), Some(ConnectionId(3)));
        assert_eq!(slot.get(Role::Initiator), None);
        slot.set(Role::Responder, None);
        assert!(slot.is_empty());
    }

    #[tokio::test]
    async fn test_double_registration_rejected() {
        let server = server();
        let conn: Arc<dyn Connection> = Arc::new(TestConn::default());
        server.on_connection(conn.clone()).await.unwrap();
        assert_eq!(
            server.on_connection(conn).await.unwrap_err(),
            ProtocolError::AlreadyRegistered
        );
        assert_eq!(server.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let server = server();
        let a = server
            .on_connection(Arc::new(TestConn::default()))
            .await
            .unwrap();
        let b = server
            .on_connection(Arc::new(TestConn::default()))
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_reregistration_after_disconnect() {
        let server = server();
        let conn: Arc<dyn Connection> = Arc::new(TestConn::default());
        let id = server.on_connection(conn.clone()).await.unwrap();
        server.on_disconnection(id).await;
        assert!(server.on_connection(conn).await.is_ok());
    }

    #[tokio::test]
    async fn test_second_auth_is_rejected() {
        let server = server();
        let conn = Arc::new(TestConn::default());
        let id = server.on_connection(conn.clone()).await.unwrap();
        let auth = AuthMessage {
            token: "tok-i".into(),
            nonce: "n".into(),
        };
        server.on_auth_message(id, auth.clone()).await.unwrap();

        let err = server.on_auth_message(id, auth).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AlreadyAuthenticated)
        ));
        assert!(conn.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_on_message_routes_through_classifier() {
        let server = server();
        let conn = Arc::new(TestConn::default());
        let id = server.on_connection(conn.clone()).await.unwrap();

        let err = server.on_message(id, "nonsense").await.unwrap_err();
        assert!(matches!(err, Error::Classification(_)));
        assert!(!conn.closed.load(Ordering::SeqCst));

        server
            .on_message(id, r#"{"type":"auth","token":"tok-i","nonce":"n"}"#)
            .await
            .unwrap();
        assert!(server.is_authenticated(id).await);
    }
}
