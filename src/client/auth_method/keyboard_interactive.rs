use derivative::Derivative;
use std::task::Poll;
use tokio::sync::oneshot;
use crate::codec::PacketEncode;
use crate::error::{Result, Error};
use crate::msg::{Msg, AuthMethodKind, AuthInfoPrompt};
use super::super::auth::AuthFailure;
use super::AuthMethod;

/// Result of the ["keyboard-interactive"][crate::Client::auth_keyboard_interactive]
/// authentication method.
#[derive(Debug, Clone)]
#[must_use]
pub enum AuthKeyboardResult {
    /// The authentication was successful.
    Success,

    /// The authentication was rejected.
    ///
    /// This is also the outcome when the prompt callback returns `None`: we answer the server
    /// with an empty response set and the server rejects it.
    Failure(AuthFailure),
}

/// A set of prompts from the server (`SSH_MSG_USERAUTH_INFO_REQUEST`, RFC 4256).
#[derive(Debug, Clone)]
pub struct AuthInfoRequest {
    /// Name of the request (may be empty).
    pub name: String,
    /// Instruction to show to the user (may be empty).
    pub instruction: String,
    /// Language tag of the texts (per RFC 3066).
    pub language_tag: String,
    /// The prompts to answer, in order.
    pub prompts: Vec<AuthInfoPrompt>,
}

/// Callback that answers the prompts of an [`AuthInfoRequest`].
///
/// Return one response per prompt, in order. Return `None` to give up on this method; we then
/// answer with no responses and the server rejects the attempt.
pub type AuthInfoHandler = Box<dyn FnMut(&AuthInfoRequest) -> Option<Vec<String>> + Send>;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct AuthKeyboardInteractive {
    username: String,
    submethods: String,
    #[derivative(Debug = "ignore")]
    handler: AuthInfoHandler,
    request_sent: bool,
    pending_response: Option<Vec<String>>,
    result_tx: Option<oneshot::Sender<Result<AuthKeyboardResult>>>,
}

impl AuthKeyboardInteractive {
    pub fn new(
        username: String,
        submethods: String,
        handler: AuthInfoHandler,
        result_tx: oneshot::Sender<Result<AuthKeyboardResult>>,
    ) -> AuthKeyboardInteractive {
        AuthKeyboardInteractive {
            username, submethods, handler,
            request_sent: false,
            pending_response: None,
            result_tx: Some(result_tx),
        }
    }

    fn send_result(&mut self, result: Result<AuthKeyboardResult>) {
        if let Some(result_tx) = self.result_tx.take() {
            let _ = result_tx.send(result);
        }
    }
}

impl AuthMethod for AuthKeyboardInteractive {
    fn kind(&self) -> AuthMethodKind {
        AuthMethodKind::KeyboardInteractive
    }

    fn recv_success(&mut self) -> Result<()> {
        self.send_result(Ok(AuthKeyboardResult::Success));
        Ok(())
    }

    fn recv_failure(&mut self, failure: AuthFailure) -> Result<()> {
        self.send_result(Ok(AuthKeyboardResult::Failure(failure)));
        Ok(())
    }

    fn recv_msg(&mut self, msg: Msg) -> Result<()> {
        let Msg::UserauthInfoRequest { name, instruction, language_tag, prompts } = msg else {
            return Err(Error::PacketNotImplemented(msg.msg_id()))
        };

        let request = AuthInfoRequest { name, instruction, language_tag, prompts };
        log::debug!("received SSH_MSG_USERAUTH_INFO_REQUEST with {} prompts", request.prompts.len());

        match (self.handler)(&request) {
            Some(responses) => {
                // a mismatched response count is an error in the caller, not in the server;
                // we report it from `auth_keyboard_interactive()` instead of killing the client
                if responses.len() != request.prompts.len() {
                    self.send_result(Err(Error::AuthInfoMismatch));
                    self.pending_response = Some(Vec::new());
                } else {
                    self.pending_response = Some(responses);
                }
            },
            // the user gave up: answer with no responses, the server will reject us
            None => self.pending_response = Some(Vec::new()),
        }
        Ok(())
    }

    fn send_msg(&mut self, _session_id: &[u8]) -> Result<Option<Msg>> {
        if !self.request_sent {
            // RFC 4256, section 3.1
            let mut method_data = PacketEncode::new();
            method_data.put_str(""); // language tag (deprecated)
            method_data.put_str(&self.submethods);

            log::debug!("sending SSH_MSG_USERAUTH_REQUEST for method 'keyboard-interactive'");
            self.request_sent = true;
            return Ok(Some(Msg::UserauthRequest {
                username: self.username.clone(),
                service: "ssh-connection".into(),
                method: "keyboard-interactive".into(),
                method_data: method_data.finish(),
            }))
        }

        if let Some(responses) = self.pending_response.take() {
            log::debug!("sending SSH_MSG_USERAUTH_INFO_RESPONSE with {} responses", responses.len());
            return Ok(Some(Msg::UserauthInfoResponse { responses }))
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

impl AuthKeyboardResult {
    /// Returns `Ok` if this is a success, `Err` otherwise.
    pub fn success_or_error(&self) -> Result<()> {
        match self {
            Self::Success => Ok(()),
            Self::Failure(_) => Err(Error::AuthFailed),
        }
    }
}
