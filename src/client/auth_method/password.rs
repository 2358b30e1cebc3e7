use std::task::Poll;
use tokio::sync::oneshot;
use crate::codec::PacketEncode;
use crate::error::{Result, Error};
use crate::msg::{Msg, AuthMethodKind};
use super::super::auth::AuthFailure;
use super::AuthMethod;

/// Result of the ["password"][crate::Client::auth_password] authentication method.
#[derive(Debug, Clone)]
#[must_use]
pub enum AuthPasswordResult {
    /// The authentication was successful.
    ///
    /// If you requested a password change, the password has been changed.
    Success,

    /// The server asks you to change your password.
    ///
    /// Respond with [`Client::auth_password_change()`][crate::Client::auth_password_change].
    /// The SSH protocol contains this mechanism to change the user password, but almost nobody
    /// implements it (neither servers nor clients), so you will probably never encounter it in
    /// the wild.
    ChangePassword(AuthPasswordPrompt),

    /// The authentication was rejected.
    ///
    /// If you requested a password change and [`AuthFailure::partial_success`] is true,
    /// then the password has been changed, but more authentications are needed. Otherwise, if
    /// `partial_success` is false, the password has not been changed.
    Failure(AuthFailure),
}

/// Prompt that the server sends when asking you to change your password.
#[derive(Debug, Clone)]
pub struct AuthPasswordPrompt {
    /// Human-readable prompt.
    pub prompt: String,
    /// Language tag of `prompt` (per RFC 3066).
    pub prompt_lang: String,
}

#[derive(Debug)]
pub struct AuthPassword {
    username: String,
    password: String,
    new_password: Option<String>,
    request_sent: bool,
    result_tx: Option<oneshot::Sender<AuthPasswordResult>>,
}

impl AuthPassword {
    pub fn new(
        username: String,
        password: String,
        result_tx: oneshot::Sender<AuthPasswordResult>,
    ) -> AuthPassword {
        AuthPassword { username, password, new_password: None, request_sent: false, result_tx: Some(result_tx) }
    }

    /// Authenticate with `old_password` and ask the server to change it to `new_password`.
    pub fn new_change(
        username: String,
        old_password: String,
        new_password: String,
        result_tx: oneshot::Sender<AuthPasswordResult>,
    ) -> AuthPassword {
        AuthPassword {
            username,
            password: old_password,
            new_password: Some(new_password),
            request_sent: false,
            result_tx: Some(result_tx),
        }
    }
}

impl AuthMethod for AuthPassword {
    fn kind(&self) -> AuthMethodKind {
        AuthMethodKind::Password
    }

    fn recv_success(&mut self) -> Result<()> {
        if let Some(result_tx) = self.result_tx.take() {
            let _ = result_tx.send(AuthPasswordResult::Success);
        }
        Ok(())
    }

    fn recv_failure(&mut self, failure: AuthFailure) -> Result<()> {
        if let Some(result_tx) = self.result_tx.take() {
            let _ = result_tx.send(AuthPasswordResult::Failure(failure));
        }
        Ok(())
    }

    fn recv_msg(&mut self, msg: Msg) -> Result<()> {
        if let Msg::UserauthPasswdChangereq { prompt, prompt_lang } = msg {
            if let Some(result_tx) = self.result_tx.take() {
                let password_prompt = AuthPasswordPrompt { prompt, prompt_lang };
                let _ = result_tx.send(AuthPasswordResult::ChangePassword(password_prompt));
            }
            Ok(())
        } else {
            Err(Error::PacketNotImplemented(msg.msg_id()))
        }
    }

    fn send_msg(&mut self, _session_id: &[u8]) -> Result<Option<Msg>> {
        if !self.request_sent {
            // RFC 4252, section 8
            let mut method_data = PacketEncode::new();
            method_data.put_bool(self.new_password.is_some());
            method_data.put_str(&self.password);
            if let Some(new_password) = self.new_password.as_ref() {
                method_data.put_str(new_password);
            }

            log::debug!("sending SSH_MSG_USERAUTH_REQUEST for method 'password'");
            self.request_sent = true;
            return Ok(Some(Msg::UserauthRequest {
                username: self.username.clone(),
                service: "ssh-connection".into(),
                method: "password".into(),
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

impl AuthPasswordResult {
    /// Returns `Ok` if this is a success, `Err` otherwise.
    pub fn success_or_error(&self) -> Result<()> {
        match self {
            Self::Success => Ok(()),
            Self::ChangePassword(_) | Self::Failure(_) => Err(Error::AuthFailed),
        }
    }
}
