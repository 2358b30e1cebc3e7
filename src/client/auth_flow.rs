use std::time::Duration;
use crate::error::{Error, Result, DisconnectError};
use crate::numbers::disconnect;
use crate::pubkey::{Privkey, PubkeyAlgo};
use super::auth_method::hostbased::{AuthHostbasedResult, HostbasedIdentity};
use super::auth_method::keyboard_interactive::{AuthInfoHandler, AuthKeyboardResult};
use super::auth_method::none::AuthNoneResult;
use super::auth_method::password::{AuthPasswordPrompt, AuthPasswordResult};
use super::auth_method::pubkey::AuthPubkeyResult;
use super::client::Client;

/// Callback that produces the user password, or `None` to skip the "password" method.
pub type PasswordPrompt = Box<dyn FnMut() -> Option<String> + Send>;

/// Callback invoked when the server demands a password change. Return the `(old, new)`
/// passwords, or `None` to give up on the "password" method.
pub type ChangePasswordPrompt =
    Box<dyn FnMut(&AuthPasswordPrompt) -> Option<(String, String)> + Send>;

/// Credentials and policy for [`Client::authenticate()`].
///
/// The driver tries the methods from [`method_order`][Self::method_order] that both the server
/// offers and these options can satisfy. Methods with missing credentials are skipped, and the
/// "password" method is additionally skipped (with a debug log) when the transport does not
/// provide both confidentiality and integrity.
#[derive(Default)]
pub struct AuthOptions {
    /// Key pairs for the "publickey" method, tried in order.
    pub identities: Vec<(Privkey, &'static PubkeyAlgo)>,

    /// Prompt for the "password" method.
    pub password: Option<PasswordPrompt>,

    /// Prompt for a password change demanded by the server.
    pub change_password: Option<ChangePasswordPrompt>,

    /// Handler for the "keyboard-interactive" method.
    pub keyboard_interactive: Option<AuthInfoHandler>,

    /// Identity for the "hostbased" method.
    pub hostbased: Option<HostbasedIdentity>,

    /// The order in which methods are preferred.
    pub method_order: Vec<&'static str>,

    /// Abort after this many authentication attempts (default 20).
    pub max_attempts: u32,

    /// Abort when authentication does not complete within this time (default 10 minutes).
    pub timeout: Duration,
}

impl AuthOptions {
    /// Options with no credentials and the default policy.
    pub fn new() -> AuthOptions {
        AuthOptions {
            identities: Vec::new(),
            password: None,
            change_password: None,
            keyboard_interactive: None,
            hostbased: None,
            method_order: vec!["publickey", "hostbased", "keyboard-interactive", "password"],
            max_attempts: 20,
            timeout: Duration::from_secs(600),
        }
    }
}

pub(super) async fn authenticate(client: &Client, username: String, options: AuthOptions) -> Result<()> {
    let mut options = options;
    if options.method_order.is_empty() {
        options.method_order = AuthOptions::new().method_order;
    }
    let timeout = if options.timeout.is_zero() {
        AuthOptions::new().timeout
    } else {
        options.timeout
    };
    let max_attempts = if options.max_attempts == 0 {
        AuthOptions::new().max_attempts
    } else {
        options.max_attempts
    };

    match tokio::time::timeout(timeout, drive(client, username, options, max_attempts)).await {
        Ok(result) => result,
        Err(_) => {
            let _ = client.disconnect(DisconnectError {
                reason_code: disconnect::BY_APPLICATION,
                description: "authentication timed out".into(),
                description_lang: "".into(),
            });
            Err(Error::AuthTimeout)
        },
    }
}

async fn drive(
    client: &Client,
    username: String,
    mut options: AuthOptions,
    max_attempts: u32,
) -> Result<()> {
    if client.is_authenticated()? {
        return Ok(())
    }

    let mut attempts = 1;

    // discover the methods that the server accepts
    let mut can_continue = match client.auth_none(username.clone()).await? {
        AuthNoneResult::Success => return Ok(()),
        AuthNoneResult::Failure(failure) => failure.methods_can_continue,
    };

    let mut password_usable = options.password.is_some();
    loop {
        let method = pick_method(&options, &can_continue, password_usable);
        let method = match method {
            Some(method) => method,
            None => {
                let _ = client.disconnect(DisconnectError {
                    reason_code: disconnect::NO_MORE_AUTH_METHODS_AVAILABLE,
                    description: "no authentication method left to try".into(),
                    description_lang: "".into(),
                });
                return Err(Error::AuthMethodsExhausted)
            },
        };

        attempts += 1;
        if attempts > max_attempts {
            let _ = client.disconnect(DisconnectError {
                reason_code: disconnect::BY_APPLICATION,
                description: "too many authentication attempts".into(),
                description_lang: "".into(),
            });
            return Err(Error::AuthAttemptsExceeded)
        }

        let failure = match method {
            "publickey" => {
                let (privkey, pubkey_algo) = options.identities.remove(0);

                // probe whether the key is acceptable before computing a signature
                if !client.check_pubkey(username.clone(), &privkey.pubkey(), pubkey_algo).await? {
                    log::debug!("server refused public key, trying the next credential");
                    continue
                }

                match client.auth_pubkey(username.clone(), privkey, pubkey_algo).await? {
                    AuthPubkeyResult::Success => return Ok(()),
                    AuthPubkeyResult::Failure(failure) => failure,
                }
            },

            "hostbased" => {
                let identity = options.hostbased.take().unwrap();
                match client.auth_hostbased(username.clone(), identity).await? {
                    AuthHostbasedResult::Success => return Ok(()),
                    AuthHostbasedResult::Failure(failure) => failure,
                }
            },

            "keyboard-interactive" => {
                let handler = options.keyboard_interactive.take().unwrap();
                match client.auth_keyboard_interactive(username.clone(), handler).await? {
                    AuthKeyboardResult::Success => return Ok(()),
                    AuthKeyboardResult::Failure(failure) => failure,
                }
            },

            "password" => {
                // a password must never travel over a transport without both encryption and
                // integrity protection, even if the server offers the method
                if !client.transport_is_protected()? {
                    log::debug!("skipping the password method, \
                        the transport lacks confidentiality or integrity");
                    password_usable = false;
                    continue
                }

                let password = match (options.password.as_mut().unwrap())() {
                    Some(password) => password,
                    None => {
                        password_usable = false;
                        continue
                    },
                };

                match client.auth_password(username.clone(), password).await? {
                    AuthPasswordResult::Success => return Ok(()),
                    AuthPasswordResult::ChangePassword(prompt) => {
                        let passwords =
                            options.change_password.as_mut().and_then(|callback| callback(&prompt));
                        let (old_password, new_password) = match passwords {
                            Some(passwords) => passwords,
                            // the user does not want to change the password, give up on the
                            // method
                            None => {
                                password_usable = false;
                                continue
                            },
                        };

                        let change_result = client
                            .auth_password_change(username.clone(), old_password, new_password)
                            .await?;
                        match change_result {
                            AuthPasswordResult::Success => return Ok(()),
                            AuthPasswordResult::ChangePassword(_) =>
                                return Err(Error::Protocol("server asked for a password change twice")),
                            AuthPasswordResult::Failure(failure) => failure,
                        }
                    },
                    AuthPasswordResult::Failure(failure) => failure,
                }
            },

            _ => unreachable!("picked an unknown method"),
        };

        if failure.partial_success {
            log::debug!("authentication method {:?} partially succeeded", method);
        }
        can_continue = failure.methods_can_continue;
    }
}

fn pick_method(
    options: &AuthOptions,
    can_continue: &[String],
    password_usable: bool,
) -> Option<&'static str> {
    for &method in options.method_order.iter() {
        let available = match method {
            "publickey" => !options.identities.is_empty(),
            "hostbased" => options.hostbased.is_some(),
            "keyboard-interactive" => options.keyboard_interactive.is_some(),
            "password" => password_usable,
            _ => false,
        };
        if available && can_continue.iter().any(|offered| offered == method) {
            return Some(method)
        }
    }
    None
}
