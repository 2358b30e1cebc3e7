pub use self::auth::{AuthFailure, sanitize_banner};
pub use self::auth_flow::{AuthOptions, PasswordPrompt, ChangePasswordPrompt};
pub use self::auth_method::hostbased::{AuthHostbasedResult, HostbasedIdentity};
pub use self::auth_method::keyboard_interactive::{
    AuthInfoHandler, AuthInfoRequest, AuthKeyboardResult,
};
pub use self::auth_method::none::AuthNoneResult;
pub use self::auth_method::password::{AuthPasswordResult, AuthPasswordPrompt};
pub use self::auth_method::pubkey::AuthPubkeyResult;
pub use self::channel::{
    Channel, ChannelReceiver, ChannelEvent, ChannelReq, ChannelReply, ChannelConfig,
    DataType, DATA_STANDARD, DATA_STDERR,
};
pub use self::client::{
    Client, ClientReceiver, ClientFuture, ClientConfig, ExecResult, GlobalReq, GlobalReply,
};
pub use self::client_event::{
    ClientEvent, DebugMsg, AuthBanner, AcceptPubkeySender, ChannelOpenRequest,
};
pub use self::session::{
    Session, SessionReceiver, SessionEvent, SessionResp, ExitSignal,
    PtyRequest, PtyTerminalModes, WindowChange,
};
pub use self::tunnel::{
    Tunnel, TunnelReceiver, TunnelEvent, ForwardedTunnel, RemoteForward,
};

#[macro_use] mod pump;
mod auth;
mod auth_flow;
mod auth_method;
mod channel;
mod channel_state;
mod client;
mod client_event;
mod client_state;
mod conn;
mod ext;
mod flow;
mod negotiate;
mod recv;
mod session;
mod tunnel;
