use std::task::Poll;
use crate::error::Result;
use crate::msg::{Msg, AuthMethodKind};
use super::auth::AuthFailure;

pub mod hostbased;
pub mod keyboard_interactive;
pub mod none;
pub mod password;
pub mod pubkey;

pub(crate) trait AuthMethod {
    fn kind(&self) -> AuthMethodKind;
    fn recv_success(&mut self) -> Result<()>;
    fn recv_failure(&mut self, failure: AuthFailure) -> Result<()>;
    fn recv_msg(&mut self, msg: Msg) -> Result<()>;
    fn send_msg(&mut self, session_id: &[u8]) -> Result<Option<Msg>>;
    fn poll(&mut self) -> Poll<Result<()>>;
}
