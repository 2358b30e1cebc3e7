use std::task::Poll;
use tokio::sync::oneshot;
use crate::codec::PacketEncode;
use crate::error::{Result, Error};
use crate::msg::{Msg, AuthMethodKind};
use super::super::auth::AuthFailure;
use super::AuthMethod;

/// Result of the ["none"][crate::Client::auth_none] authentication method.
#[derive(Debug, Clone)]
#[must_use]
pub enum AuthNoneResult {
    /// The authentication was successful.
    Success,

    /// The authentication was rejected.
    ///
    /// The server lists the methods that can continue in the failure, so this method is
    /// commonly used to probe which methods the server supports.
    Failure(AuthFailure),
}

#[derive(Debug)]
pub struct AuthNone {
    username: String,
    request_sent: bool,
    result_tx: Option<oneshot::Sender<AuthNoneResult>>,
}

impl AuthNone {
    pub fn new(username: String, result_tx: oneshot::Sender<AuthNoneResult>) -> AuthNone {
        AuthNone { username, request_sent: false, result_tx: Some(result_tx) }
    }
}

impl AuthMethod for AuthNone {
    fn kind(&self) -> AuthMethodKind {
        AuthMethodKind::None
    }

    fn recv_success(&mut self) -> Result<()> {
        if let Some(result_tx) = self.result_tx.take() {
            let _ = result_tx.send(AuthNoneResult::Success);
        }
        Ok(())
    }

    fn recv_failure(&mut self, failure: AuthFailure) -> Result<()> {
        if let Some(result_tx) = self.result_tx.take() {
            let _ = result_tx.send(AuthNoneResult::Failure(failure));
        }
        Ok(())
    }

    fn recv_msg(&mut self, msg: Msg) -> Result<()> {
        Err(Error::PacketNotImplemented(msg.msg_id()))
    }

    fn send_msg(&mut self, _session_id: &[u8]) -> Result<Option<Msg>> {
        if !self.request_sent {
            log::debug!("sending SSH_MSG_USERAUTH_REQUEST for method 'none'");
            self.request_sent = true;
            return Ok(Some(Msg::UserauthRequest {
                username: self.username.clone(),
                service: "ssh-connection".into(),
                method: "none".into(),
                method_data: PacketEncode::new().finish(),
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
