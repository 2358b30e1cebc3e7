use tokio::sync::watch;
use std::task::Context;
use crate::error::{Result, Error};
use crate::msg::{Msg, AuthMethodKind};
use super::negotiate;
use super::auth_method::AuthMethod;
use super::client_event::{ClientEvent, AuthBanner};
use super::client_state::{self, ClientState};
use super::pump::Pump;
use super::recv::{self, ResultRecvState};

/// Message sent by the server when an authentication attempt fails.
///
/// This corresponds to `SSH_MSG_USERAUTH_FAILURE` (RFC 4252, section 5.1). Note that this may
/// actually represent a [partial success][Self::partial_success].
#[derive(Debug, Clone)]
pub struct AuthFailure {
    /// Authentication methods that may productively continue the authentication.
    ///
    /// Note that the server must not list the `"none"` method here, even if it is supported.
    pub methods_can_continue: Vec<String>,

    /// True if the authentication request was successful, but the authentication should
    /// continue.
    ///
    /// For example, this might be used if the server requires that you pass multiple
    /// authentications before continuing.
    pub partial_success: bool,
}

pub(super) struct AuthState {
    service_requested: bool,
    service_accepted: bool,
    method: Option<Box<dyn AuthMethod + Send>>,
    success: bool,
    success_tx: watch::Sender<bool>,
}

pub(super) fn init_auth() -> AuthState {
    AuthState {
        service_requested: false,
        service_accepted: false,
        method: None,
        success: false,
        success_tx: watch::channel(false).0,
    }
}

pub(super) fn start_method(st: &mut ClientState, method: Box<dyn AuthMethod + Send>) -> Result<()> {
    if st.auth_st.success {
        return Err(Error::AuthFailed)
    }
    if st.auth_st.method.is_none() {
        st.auth_st.method = Some(method);
        client_state::wakeup_client(st);
        Ok(())
    } else {
        Err(Error::AuthMethodPending)
    }
}

pub(super) fn pump_auth(st: &mut ClientState, _cx: &mut Context) -> Result<Pump> {
    if !st.auth_st.service_requested && negotiate::is_ready(st) {
        client_state::send_msg(st, &Msg::ServiceRequest { service: "ssh-userauth".into() })?;
        log::debug!("sending SSH_MSG_SERVICE_REQUEST for 'ssh-userauth'");
        st.auth_st.service_requested = true;
        return Ok(Pump::Progress)
    }

    if st.auth_st.service_accepted && st.auth_st.method.is_some() {
        if st.auth_st.success {
            st.auth_st.method.as_mut().unwrap().recv_success()?;
        }

        if negotiate::is_ready(st) {
            let session_id = st.session_id.as_ref().unwrap().clone();
            if let Some(msg) = st.auth_st.method.as_mut().unwrap().send_msg(&session_id)? {
                client_state::send_msg(st, &msg)?;
                return Ok(Pump::Progress)
            }
        }

        pump_ready!(st.auth_st.method.as_mut().unwrap().poll())?;
        st.auth_st.method = None;
        return Ok(Pump::Progress)
    }

    Ok(Pump::Pending)
}

pub(super) fn recv_service_accept(st: &mut ClientState) -> ResultRecvState {
    log::debug!("received SSH_MSG_SERVICE_ACCEPT for 'ssh-userauth'");
    st.auth_st.service_accepted = true;
    Ok(None)
}

/// The authentication method in flight, used to decode the overloaded message ids 60 to 79.
pub(super) fn method_kind(st: &ClientState) -> Option<AuthMethodKind> {
    st.auth_st.method.as_ref().map(|method| method.kind())
}

pub(super) fn recv_auth_msg(st: &mut ClientState, msg: Msg) -> ResultRecvState {
    match msg {
        Msg::UserauthBanner { message, message_lang } =>
            recv_auth_banner(message, message_lang),
        // after success, the authentication layer ignores everything except banners
        _ if st.auth_st.success => {
            log::debug!("ignoring authentication message {} after success", msg.msg_id());
            Ok(None)
        },
        Msg::UserauthFailure { methods_can_continue, partial_success } =>
            recv_auth_failure(st, AuthFailure { methods_can_continue, partial_success }),
        Msg::UserauthSuccess => recv_auth_success(st),
        msg => recv_auth_method_msg(st, msg),
    }
}

fn recv_auth_method_msg(st: &mut ClientState, msg: Msg) -> ResultRecvState {
    if let Some(method) = st.auth_st.method.as_mut() {
        method.recv_msg(msg)?;
        Ok(None)
    } else {
        Err(Error::PacketNotImplemented(msg.msg_id()))
    }
}

fn recv_auth_failure(st: &mut ClientState, failure: AuthFailure) -> ResultRecvState {
    log::debug!("received SSH_MSG_USERAUTH_FAILURE: {:?}", failure);

    if let Some(method) = st.auth_st.method.as_mut() {
        method.recv_failure(failure)?;
        Ok(None)
    } else {
        Err(Error::Protocol("received unexpected SSH_MSG_USERAUTH_FAILURE"))
    }
}

fn recv_auth_success(st: &mut ClientState) -> ResultRecvState {
    st.auth_st.success = true;
    let _ = st.auth_st.success_tx.send(true);

    // delayed compression (zlib@openssh.com) starts now
    st.codec.send_pipe.activate_delayed_compress();
    st.codec.recv_pipe.activate_delayed_decompress();

    log::debug!("received SSH_MSG_USERAUTH_SUCCESS");
    Ok(None)
}

fn recv_auth_banner(message: String, message_lang: String) -> ResultRecvState {
    let banner = AuthBanner {
        message: sanitize_banner(&message),
        message_lang,
    };
    recv::send_event(ClientEvent::AuthBanner(banner))
}

pub(super) fn is_authenticated(st: &ClientState) -> bool {
    st.auth_st.success
}

pub(super) fn subscribe_success(st: &ClientState) -> watch::Receiver<bool> {
    st.auth_st.success_tx.subscribe()
}


const BANNER_LINE_MAX: usize = 1024;
const BANNER_TOTAL_MAX: usize = 8192;

/// Sanitize a banner for display (RFC 4252, section 5.4 warns that the banner is
/// attacker-controlled terminal input).
///
/// Tabs, newlines, carriage returns, printable ASCII and multi-byte UTF-8 pass through; other
/// control characters are escaped as `\xHH`. Lines are capped at 1024 characters and the whole
/// banner at 8192 characters; truncation never splits an escape or a multi-byte character.
pub fn sanitize_banner(banner: &str) -> String {
    let mut out = String::new();
    let mut line_len = 0;

    for c in banner.chars() {
        if c == '\n' {
            if out.len() + 1 > BANNER_TOTAL_MAX {
                break
            }
            out.push(c);
            line_len = 0;
            continue
        }

        let passthrough = c == '\t' || c == '\r' || (' '..='~').contains(&c) || !c.is_ascii();
        // remaining C0 controls and DEL become visible `\xHH` escapes
        let push_len = if passthrough { c.len_utf8() } else { 4 };

        if out.len() + push_len > BANNER_TOTAL_MAX {
            break
        }
        if line_len + push_len > BANNER_LINE_MAX {
            continue
        }

        if passthrough {
            out.push(c);
        } else {
            out.push_str(&format!("\\x{:02x}", c as u32));
        }
        line_len += push_len;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_passthrough() {
        assert_eq!(sanitize_banner("welcome to the server\n"), "welcome to the server\n");
        assert_eq!(sanitize_banner("tab\there\r\n"), "tab\there\r\n");
        assert_eq!(sanitize_banner("vítejte, ahoj"), "vítejte, ahoj");
    }

    #[test]
    fn test_sanitize_escapes_controls() {
        assert_eq!(sanitize_banner("\x1b[31mred\x1b[0m"), "\\x1b[31mred\\x1b[0m");
        assert_eq!(sanitize_banner("bell\x07"), "bell\\x07");
        assert_eq!(sanitize_banner("\x00"), "\\x00");
    }

    #[test]
    fn test_sanitize_caps_line_length() {
        let long_line = "x".repeat(5000);
        let sanitized = sanitize_banner(&long_line);
        assert_eq!(sanitized.len(), BANNER_LINE_MAX);

        // a newline resets the line budget
        let two_lines = format!("{}\n{}", "x".repeat(5000), "y".repeat(10));
        let sanitized = sanitize_banner(&two_lines);
        assert_eq!(sanitized.len(), BANNER_LINE_MAX + 1 + 10);
    }

    #[test]
    fn test_sanitize_caps_total_length() {
        let huge = "z\n".repeat(10_000);
        let sanitized = sanitize_banner(&huge);
        assert!(sanitized.len() <= BANNER_TOTAL_MAX);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "hello\nworld",
            "\x1b[31mred\x1b[0m",
            "tab\there",
            "vítejte\x07",
        ];
        for input in inputs {
            let once = sanitize_banner(input);
            assert_eq!(sanitize_banner(&once), once);
        }

        let long = "a".repeat(9000);
        let once = sanitize_banner(&long);
        assert_eq!(sanitize_banner(&once), once);
    }
}
