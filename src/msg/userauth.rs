use crate::codec::{PacketDecode, PacketEncode};
use crate::error::{Error, Result};
use crate::numbers::msg;
use super::{Msg, MsgCx, AuthMethodKind, expect_end};

/// A single prompt of `SSH_MSG_USERAUTH_INFO_REQUEST` (RFC 4256, section 3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfoPrompt {
    /// Text of the prompt to show to the user.
    pub prompt: String,
    /// True if the user input should be echoed while typing.
    pub echo: bool,
}

pub(super) fn decode(msg_id: u8, p: &mut PacketDecode, cx: MsgCx) -> Result<Msg> {
    match msg_id {
        msg::USERAUTH_REQUEST => {
            Ok(Msg::UserauthRequest {
                username: p.get_string()?,
                service: p.get_string()?,
                method: p.get_string()?,
                method_data: p.remaining(),
            })
        },
        msg::USERAUTH_FAILURE => {
            let m = Msg::UserauthFailure {
                methods_can_continue: p.get_name_list()?,
                partial_success: p.get_bool()?,
            };
            expect_end(p)?;
            Ok(m)
        },
        msg::USERAUTH_SUCCESS => {
            expect_end(p)?;
            Ok(Msg::UserauthSuccess)
        },
        msg::USERAUTH_BANNER => {
            let m = Msg::UserauthBanner {
                message: p.get_string()?,
                message_lang: p.get_string()?,
            };
            expect_end(p)?;
            Ok(m)
        },
        60..=79 => decode_method(msg_id, p, cx),
        _ => Err(Error::PacketNotImplemented(msg_id)),
    }
}

fn decode_method(msg_id: u8, p: &mut PacketDecode, cx: MsgCx) -> Result<Msg> {
    // ids 60 to 79 are method-specific (RFC 4252, section 6), the same id means different
    // messages for different methods
    let method = match cx.auth {
        Some(method) => method,
        None => return Err(Error::Protocol(
            "received authentication method message, but no method is in progress")),
    };

    let m = match (method, msg_id) {
        (AuthMethodKind::Pubkey, msg::USERAUTH_PK_OK) => Msg::UserauthPkOk {
            pubkey_algo_name: p.get_string()?,
            pubkey: p.get_bytes()?,
        },
        (AuthMethodKind::Password, msg::USERAUTH_PASSWD_CHANGEREQ) => Msg::UserauthPasswdChangereq {
            prompt: p.get_string()?,
            prompt_lang: p.get_string()?,
        },
        (AuthMethodKind::KeyboardInteractive, msg::USERAUTH_INFO_REQUEST) => {
            let name = p.get_string()?;
            let instruction = p.get_string()?;
            let language_tag = p.get_string()?;
            let prompt_count = p.get_u32()?;
            let mut prompts = Vec::new();
            for _ in 0..prompt_count {
                prompts.push(AuthInfoPrompt {
                    prompt: p.get_string()?,
                    echo: p.get_bool()?,
                });
            }
            Msg::UserauthInfoRequest { name, instruction, language_tag, prompts }
        },
        (AuthMethodKind::KeyboardInteractive, msg::USERAUTH_INFO_RESPONSE) => {
            let response_count = p.get_u32()?;
            let mut responses = Vec::new();
            for _ in 0..response_count {
                responses.push(p.get_string()?);
            }
            Msg::UserauthInfoResponse { responses }
        },
        _ => return Err(Error::PacketNotImplemented(msg_id)),
    };
    expect_end(p)?;
    Ok(m)
}

pub(super) fn encode(m: &Msg, p: &mut PacketEncode) {
    match m {
        Msg::UserauthRequest { username, service, method, method_data } => {
            p.put_str(username);
            p.put_str(service);
            p.put_str(method);
            p.put_raw(method_data);
        },
        Msg::UserauthFailure { methods_can_continue, partial_success } => {
            p.put_name_list_owned(methods_can_continue);
            p.put_bool(*partial_success);
        },
        Msg::UserauthSuccess => {},
        Msg::UserauthBanner { message, message_lang } => {
            p.put_str(message);
            p.put_str(message_lang);
        },
        Msg::UserauthPkOk { pubkey_algo_name, pubkey } => {
            p.put_str(pubkey_algo_name);
            p.put_bytes(pubkey);
        },
        Msg::UserauthPasswdChangereq { prompt, prompt_lang } => {
            p.put_str(prompt);
            p.put_str(prompt_lang);
        },
        Msg::UserauthInfoRequest { name, instruction, language_tag, prompts } => {
            p.put_str(name);
            p.put_str(instruction);
            p.put_str(language_tag);
            p.put_u32(prompts.len() as u32);
            for prompt in prompts {
                p.put_str(&prompt.prompt);
                p.put_bool(prompt.echo);
            }
        },
        Msg::UserauthInfoResponse { responses } => {
            p.put_u32(responses.len() as u32);
            for response in responses {
                p.put_str(response);
            }
        },
        _ => unreachable!("message is not an authentication message"),
    }
}
