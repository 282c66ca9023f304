//! The SRP auth channel state machine (spec.md §4.C, states S0-S8).
//!
//! Grounded on `original_source`'s `api/routes/auth/comms.py`, generalized
//! from a concrete FastAPI `WebSocket` onto a small `AuthTransport` trait
//! so the handshake logic is exercised in tests without a live socket. The
//! server-glue layer adapts an `axum::extract::ws::WebSocket` to this
//! trait.

use base64::Engine;
use num_bigint::BigUint;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::cache::SessionCache;
use crate::exef::gcm::GcmEngine;
use crate::srp::{engine as srp_engine, group::SrpGroup};
use crate::users::UserStore;

use super::jwt;

const MAX_RETRIES: usize = 3;

/// Large-group exponentiations are offloaded onto the blocking thread pool
/// so a 2048-bit handshake doesn't stall the async runtime's worker
/// threads, the same way the teacher offloads its own CPU/IO-bound git
/// operations (`repo/mod.rs::tokio::task::spawn_blocking`). Below this bit
/// size the modpow cost is small enough that the extra thread hop isn't
/// worth it.
const SPAWN_BLOCKING_THRESHOLD_BITS: usize = 2048;

async fn server_public_value(
    group: &'static SrpGroup,
    verifier: BigUint,
    forced_private: Option<BigUint>,
) -> (BigUint, BigUint) {
    if group.bits >= SPAWN_BLOCKING_THRESHOLD_BITS {
        tokio::task::spawn_blocking(move || srp_engine::compute_server_public_value(group, &verifier, forced_private))
            .await
            .expect("SRP server-public-value computation panicked")
    } else {
        srp_engine::compute_server_public_value(group, &verifier, forced_private)
    }
}

async fn premaster_secret(
    group: &'static SrpGroup,
    a_pub: BigUint,
    server_private: BigUint,
    u: BigUint,
    verifier: BigUint,
) -> BigUint {
    if group.bits >= SPAWN_BLOCKING_THRESHOLD_BITS {
        tokio::task::spawn_blocking(move || srp_engine::compute_premaster(group, &a_pub, &server_private, &u, &verifier))
            .await
            .expect("SRP premaster computation panicked")
    } else {
        srp_engine::compute_premaster(group, &a_pub, &server_private, &u, &verifier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub data: String,
    #[serde(default)]
    pub binary: bool,
}

impl ChannelMessage {
    pub fn ok_text(data: impl Into<String>) -> Self {
        Self { status: Some("OK".into()), data: data.into(), binary: false }
    }

    pub fn ok_binary(bytes: &[u8]) -> Self {
        Self {
            status: Some("OK".into()),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            binary: true,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { status: Some("ERR".into()), data: message.into(), binary: false }
    }

    pub fn push_text(data: impl Into<String>) -> Self {
        Self { status: None, data: data.into(), binary: false }
    }

    pub fn push_binary(bytes: &[u8]) -> Self {
        Self { status: None, data: base64::engine::general_purpose::STANDARD.encode(bytes), binary: true }
    }

    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("OK")
    }

    pub fn binary_payload(&self) -> Option<Vec<u8>> {
        if !self.binary {
            return None;
        }
        base64::engine::general_purpose::STANDARD.decode(&self.data).ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("transport closed or errored: {0}")]
    Transport(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Transport abstraction over the bidirectional, ordered message stream.
/// No trait-object support is required — the handshake is driven
/// generically — so this is a plain (non-dyn) async trait, stable since
/// Rust 1.75 without the `async-trait` crate.
pub trait AuthTransport {
    async fn send(&mut self, msg: ChannelMessage) -> Result<(), ChannelError>;
    async fn recv(&mut self) -> Result<ChannelMessage, ChannelError>;
    async fn close(&mut self);
}

/// Runs one full S0-S8 handshake over `transport`. On success, the
/// session's master key has been registered in `sessions` and the client
/// has received its encrypted bearer token; the socket is closed either
/// way before this returns.
pub async fn run_auth_session<T: AuthTransport>(
    transport: &mut T,
    group: &'static SrpGroup,
    users: &dyn UserStore,
    server_secret: &[u8],
    session_duration_secs: i64,
) -> Result<Option<SessionOutcome>, ChannelError> {
    run_auth_session_with_test_hooks(transport, group, users, server_secret, session_duration_secs, None).await
}

/// Same as `run_auth_session`, but accepts a deterministic server SRP
/// private exponent — mirroring `original_source`'s debug-only
/// `EXCALIBUR_SERVER_TEST_B_PRIV` hook — so a full handshake can be
/// scripted end-to-end in a test without needing a live, two-sided
/// transport.
pub async fn run_auth_session_with_test_hooks<T: AuthTransport>(
    transport: &mut T,
    group: &'static SrpGroup,
    users: &dyn UserStore,
    server_secret: &[u8],
    session_duration_secs: i64,
    forced_b_priv: Option<BigUint>,
) -> Result<Option<SessionOutcome>, ChannelError> {
    // S1
    let username = match transport.recv().await? {
        msg if !msg.binary => msg.data,
        _ => return Err(ChannelError::Protocol("expected username as text".into())),
    };
    let user = match users.get_user(&username).await.map_err(ChannelError::Internal)? {
        Some(u) => u,
        None => {
            transport.send(ChannelMessage::err("User does not exist")).await?;
            transport.close().await;
            return Ok(None);
        }
    };

    // S2
    transport.send(ChannelMessage::ok_text(group.bits.to_string())).await?;

    // S3
    let verifier = user.verifier.clone();
    let mut b_priv_pub = None;
    for _ in 0..MAX_RETRIES {
        let (b_priv, b_pub) = server_public_value(group, verifier.clone(), forced_b_priv.clone()).await;
        transport.send(ChannelMessage::push_binary(&b_pub.to_bytes_be())).await?;
        let response = transport.recv().await?;
        if response.is_ok() {
            b_priv_pub = Some((b_priv, b_pub));
            break;
        }
    }
    let (b_priv, b_pub) = match b_priv_pub {
        Some(pair) => pair,
        None => {
            transport.send(ChannelMessage::err("Client refused all server's public values")).await?;
            transport.close().await;
            return Ok(None);
        }
    };

    // S4
    let mut a_pub_opt = None;
    for _ in 0..MAX_RETRIES {
        let msg = transport.recv().await?;
        let bytes = msg.binary_payload().ok_or_else(|| ChannelError::Protocol("expected binary A".into()))?;
        let a_pub = BigUint::from_bytes_be(&bytes);
        if srp_engine::is_invalid_public_value(group, &a_pub) {
            transport.send(ChannelMessage::err("A mod N cannot be 0")).await?;
            continue;
        }
        transport.send(ChannelMessage::ok_text("OK")).await?;
        a_pub_opt = Some(a_pub);
        break;
    }
    let a_pub = match a_pub_opt {
        Some(a) => a,
        None => {
            transport.close().await;
            return Ok(None);
        }
    };

    // S5
    let u = srp_engine::compute_u(group, &a_pub, &b_pub);
    if u == BigUint::from(0u32) {
        transport.send(ChannelMessage::err("Shared U value is zero")).await?;
        transport.close().await;
        return Ok(None);
    }
    transport.send(ChannelMessage::ok_text("U is OK")).await?;

    // S6
    let premaster = premaster_secret(group, a_pub.clone(), b_priv.clone(), u.clone(), verifier.clone()).await;
    let master = srp_engine::premaster_to_master(group, &premaster);
    let m1_server = srp_engine::generate_m1(group, &user.srp_salt, &a_pub, &b_pub, &master, Some(&username), false);

    let m1_msg = transport.recv().await?;
    let m1_client = m1_msg.binary_payload().ok_or_else(|| ChannelError::Protocol("expected binary M1".into()))?;
    if m1_client != m1_server {
        transport.send(ChannelMessage::err("M1 values do not match")).await?;
        transport.close().await;
        return Ok(None);
    }
    transport.send(ChannelMessage::ok_text("OK")).await?;

    // S7
    let m2 = srp_engine::generate_m2(&a_pub, &m1_server, &master);
    transport.send(ChannelMessage::ok_binary(&m2)).await?;
    if !transport.recv().await?.is_ok() {
        transport.close().await;
        return Ok(None);
    }

    // S8
    let uuid = random_session_uuid();
    let token = jwt::generate_token(&username, &uuid, server_secret, chrono::Utc::now().timestamp() + session_duration_secs)
        .map_err(|e| ChannelError::Internal(e.into()))?;

    let encrypted = encrypt_token_for_delivery(&master, token.as_bytes())
        .map_err(|e| ChannelError::Internal(anyhow::anyhow!("{e}")))?;
    transport.send(ChannelMessage::push_text(serde_json::to_string(&encrypted).map_err(|e| ChannelError::Internal(e.into()))?)).await?;
    transport.close().await;

    Ok(Some(SessionOutcome { username, uuid, master }))
}

/// Registers the handshake's session in the shared cache. Split out from
/// `run_auth_session` so the handshake itself stays testable without a
/// live `SessionCache`.
pub async fn register_session(sessions: &SessionCache, outcome: &SessionOutcome) {
    sessions.put(outcome.uuid.clone(), outcome.master).await;
}

pub struct SessionOutcome {
    pub username: String,
    pub uuid: String,
    pub master: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedTokenEnvelope {
    nonce: String,
    token: String,
    tag: String,
}

fn random_session_uuid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn encrypt_token_for_delivery(master: &[u8; 32], token: &[u8]) -> Result<EncryptedTokenEnvelope, crate::exef::ExefError> {
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut engine = GcmEngine::new(master, &nonce)?;
    let ciphertext = engine.apply_keystream(token);
    engine.absorb_ciphertext(&ciphertext);
    let tag = engine.finalize();

    Ok(EncryptedTokenEnvelope {
        nonce: base64::engine::general_purpose::STANDARD.encode(nonce),
        token: base64::engine::general_purpose::STANDARD.encode(ciphertext),
        tag: base64::engine::general_purpose::STANDARD.encode(tag),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srp::engine::{compute_premaster, compute_server_public_value, compute_u, generate_m1, random_private_value};
    use crate::srp::group::SrpGroupName;
    use crate::users::UserRecord;
    use futures_util::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MockTransport {
        inbox: VecDeque<ChannelMessage>,
        outbox: Vec<ChannelMessage>,
        closed: bool,
    }

    impl MockTransport {
        fn new(inbox: Vec<ChannelMessage>) -> Self {
            Self { inbox: inbox.into(), outbox: Vec::new(), closed: false }
        }
    }

    impl AuthTransport for MockTransport {
        async fn send(&mut self, msg: ChannelMessage) -> Result<(), ChannelError> {
            self.outbox.push(msg);
            Ok(())
        }

        async fn recv(&mut self) -> Result<ChannelMessage, ChannelError> {
            self.inbox.pop_front().ok_or_else(|| ChannelError::Transport("no more messages".into()))
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    struct InMemoryUsers(Mutex<Option<UserRecord>>);

    impl UserStore for InMemoryUsers {
        fn get_user<'a>(&'a self, username: &'a str) -> BoxFuture<'a, anyhow::Result<Option<UserRecord>>> {
            Box::pin(async move {
                let guard = self.0.lock().unwrap();
                Ok(guard.as_ref().filter(|u| u.username == username).cloned())
            })
        }
        fn add_user<'a>(&'a self, record: UserRecord) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                *self.0.lock().unwrap() = Some(record);
                Ok(())
            })
        }
        fn remove_user<'a>(&'a self, _username: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    #[tokio::test]
    async fn unknown_user_sends_err_and_closes() {
        let group = SrpGroup::for_name(SrpGroupName::Small);
        let users = InMemoryUsers(Mutex::new(None));
        let mut transport = MockTransport::new(vec![ChannelMessage::push_text("ghost")]);

        let result = run_auth_session(&mut transport, group, &users, b"secret", 3600).await.unwrap();
        assert!(result.is_none());
        assert!(transport.closed);
        assert!(transport.outbox.iter().any(|m| m.status.as_deref() == Some("ERR")));
    }

    #[tokio::test]
    async fn full_handshake_with_honest_client_succeeds() {
        let group = SrpGroup::for_name(SrpGroupName::Small);
        let username = "alice".to_string();
        let salt = vec![1u8; 16];
        let verifier = group.g.modpow(&BigUint::from(42u32), &group.n);

        let users = InMemoryUsers(Mutex::new(Some(UserRecord {
            username: username.clone(),
            auk_salt: vec![0u8; 16],
            srp_salt: salt.clone(),
            verifier: verifier.clone(),
            key_enc: None,
        })));

        // Fix the server's SRP private exponent (the debug-only hook) so the
        // whole transcript can be computed up front, exactly as an honest
        // client would, and scripted into the mock transport's inbox.
        let b_priv = BigUint::from(999_999_937u64);
        let (_, b_pub) = compute_server_public_value(&group, &verifier, Some(b_priv.clone()));

        let a_priv = random_private_value();
        let a_pub = group.g.modpow(&a_priv, &group.n);

        let u = compute_u(&group, &a_pub, &b_pub);
        assert_ne!(u, BigUint::from(0u32));
        let premaster = compute_premaster(&group, &a_pub, &b_priv, &u, &verifier);
        let master = crate::srp::engine::premaster_to_master(&group, &premaster);
        let m1 = generate_m1(&group, &salt, &a_pub, &b_pub, &master, Some(&username), false);

        let mut transport = MockTransport::new(vec![
            ChannelMessage::push_text(username.clone()),       // S1: client sends username
            ChannelMessage::ok_text("OK"),                      // S3: client accepts B
            ChannelMessage::push_binary(&a_pub.to_bytes_be()), // S4: client sends A
            ChannelMessage::push_binary(&m1),                  // S6: client sends M1
            ChannelMessage::ok_text("OK"),                      // S7: client accepts M2
        ]);

        let outcome = run_auth_session_with_test_hooks(&mut transport, group, &users, b"secret", 3600, Some(b_priv))
            .await
            .unwrap()
            .expect("handshake should succeed for an honest client");

        assert_eq!(outcome.username, username);
        assert_eq!(outcome.master, master);
        assert!(transport.closed);

        // The last message sent must be the JSON envelope carrying the
        // AES-GCM-wrapped bearer token, decryptable under the shared master.
        let envelope_msg = transport.outbox.last().unwrap();
        let envelope: EncryptedTokenEnvelope = serde_json::from_str(&envelope_msg.data).unwrap();
        let nonce = base64::engine::general_purpose::STANDARD.decode(&envelope.nonce).unwrap();
        let ciphertext = base64::engine::general_purpose::STANDARD.decode(&envelope.token).unwrap();
        let tag = base64::engine::general_purpose::STANDARD.decode(&envelope.tag).unwrap();

        let mut nonce_arr = [0u8; 12];
        nonce_arr.copy_from_slice(&nonce);
        let mut engine = GcmEngine::new(&master, &nonce_arr).unwrap();
        let plaintext = engine.apply_keystream(&ciphertext);
        engine.absorb_ciphertext(&ciphertext);
        let computed_tag = engine.finalize();
        assert_eq!(computed_tag.to_vec(), tag);

        let token = String::from_utf8(plaintext).unwrap();
        let claims = jwt::decode_token(&token, b"secret").unwrap();
        assert_eq!(claims.sub, username);
        assert_eq!(claims.uuid, outcome.uuid);
    }

    #[tokio::test]
    async fn m1_mismatch_aborts_without_registering_session() {
        let group = SrpGroup::for_name(SrpGroupName::Small);
        let username = "bob".to_string();
        let verifier = group.g.modpow(&BigUint::from(7u32), &group.n);
        let users = InMemoryUsers(Mutex::new(Some(UserRecord {
            username: username.clone(),
            auk_salt: vec![0u8; 16],
            srp_salt: vec![2u8; 16],
            verifier,
            key_enc: None,
        })));

        let a_priv = random_private_value();
        let a_pub = group.g.modpow(&a_priv, &group.n);

        let mut transport = MockTransport::new(vec![
            ChannelMessage::push_text(username),
            ChannelMessage::ok_text("OK"),
            ChannelMessage::push_binary(&a_pub.to_bytes_be()),
            ChannelMessage::push_binary(b"deliberately-wrong-m1-bytes"),
        ]);

        let result = run_auth_session(&mut transport, group, &users, b"secret", 3600).await.unwrap();
        assert!(result.is_none());
    }
}
