use bytes::Bytes;
use derivative::Derivative;
use std::task::Poll;
use tokio::sync::oneshot;
use crate::codec::PacketEncode;
use crate::error::{Result, Error};
use crate::msg::{Msg, AuthMethodKind};
use crate::numbers::msg;
use crate::pubkey::{PubkeyAlgo, Privkey};
use super::super::auth::AuthFailure;
use super::AuthMethod;

/// Result of the ["hostbased"][crate::Client::auth_hostbased] authentication method.
#[derive(Debug, Clone)]
#[must_use]
pub enum AuthHostbasedResult {
    /// The authentication was successful.
    Success,

    /// The authentication was rejected.
    Failure(AuthFailure),
}

/// The identity of the client host for ["hostbased"][crate::Client::auth_hostbased]
/// authentication (RFC 4252, section 9).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct HostbasedIdentity {
    /// Private host key of the client host.
    #[derivative(Debug = "ignore")]
    pub privkey: Privkey,
    /// Algorithm to sign with.
    pub pubkey_algo: &'static PubkeyAlgo,
    /// Fully qualified domain name of the client host.
    pub client_host_name: String,
    /// User name on the client host.
    pub client_username: String,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct AuthHostbased {
    username: String,
    #[derivative(Debug = "ignore")]
    identity: HostbasedIdentity,
    pubkey_blob: Bytes,
    request_sent: bool,
    result_tx: Option<oneshot::Sender<Result<AuthHostbasedResult>>>,
}

impl AuthHostbased {
    pub fn new(
        username: String,
        identity: HostbasedIdentity,
        result_tx: oneshot::Sender<Result<AuthHostbasedResult>>,
    ) -> AuthHostbased {
        let pubkey_blob = identity.privkey.pubkey().encode();
        AuthHostbased {
            username, identity, pubkey_blob,
            request_sent: false, result_tx: Some(result_tx),
        }
    }

    fn send_result(&mut self, result: Result<AuthHostbasedResult>) {
        if let Some(result_tx) = self.result_tx.take() {
            let _ = result_tx.send(result);
        }
    }
}

impl AuthMethod for AuthHostbased {
    fn kind(&self) -> AuthMethodKind {
        AuthMethodKind::Hostbased
    }

    fn recv_success(&mut self) -> Result<()> {
        self.send_result(Ok(AuthHostbasedResult::Success));
        Ok(())
    }

    fn recv_failure(&mut self, failure: AuthFailure) -> Result<()> {
        self.send_result(Ok(AuthHostbasedResult::Failure(failure)));
        Ok(())
    }

    fn recv_msg(&mut self, msg: Msg) -> Result<()> {
        Err(Error::PacketNotImplemented(msg.msg_id()))
    }

    fn send_msg(&mut self, session_id: &[u8]) -> Result<Option<Msg>> {
        if !self.request_sent && self.result_tx.is_some() {
            let algo_name = self.identity.pubkey_algo.name;

            // the signature covers the session id and the whole request (RFC 4252, section 9)
            let mut signed = PacketEncode::new();
            signed.put_bytes(session_id);
            signed.put_u8(msg::USERAUTH_REQUEST);
            signed.put_str(&self.username);
            signed.put_str("ssh-connection");
            signed.put_str("hostbased");
            signed.put_str(algo_name);
            signed.put_bytes(&self.pubkey_blob);
            signed.put_str(&self.identity.client_host_name);
            signed.put_str(&self.identity.client_username);
            let signed = signed.finish();

            let signature = match (self.identity.pubkey_algo.sign)(&self.identity.privkey, &signed) {
                Ok(signature) => signature,
                Err(err) => {
                    // incompatible `privkey` and `pubkey_algo` surface from
                    // `Client::auth_hostbased()` instead of killing the client
                    self.send_result(Err(err));
                    return Ok(None)
                },
            };

            let mut method_data = PacketEncode::new();
            method_data.put_str(algo_name);
            method_data.put_bytes(&self.pubkey_blob);
            method_data.put_str(&self.identity.client_host_name);
            method_data.put_str(&self.identity.client_username);
            method_data.put_bytes(&signature);

            log::debug!("sending SSH_MSG_USERAUTH_REQUEST for method 'hostbased'");
            self.request_sent = true;

            return Ok(Some(Msg::UserauthRequest {
                username: self.username.clone(),
                service: "ssh-connection".into(),
                method: "hostbased".into(),
                method_data: method_data.finish(),
            }))
        }
        Ok(None)
    }

    fn poll(&mut self) -> Poll<Result<()>> {
        if self.result_tx.is_some() {
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }
}

impl AuthHostbasedResult {
    /// Returns `Ok` if this is a success, `Err` otherwise.
    pub fn success_or_error(&self) -> Result<()> {
        match self {
            Self::Success => Ok(()),
            Self::Failure(_) => Err(Error::AuthFailed),
        }
    }
}
