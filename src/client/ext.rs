use bytes::Bytes;
use crate::error::Result;
use super::client_state::ClientState;
use super::recv::ResultRecvState;

#[derive(Debug, Default)]
pub(super) struct TheirExtInfo {
    pub auth_pubkey_algo_names: Option<Vec<String>>,
}

pub(super) fn recv_ext_info(
    st: &mut ClientState,
    extensions: Vec<(String, Bytes)>,
) -> ResultRecvState {
    log::debug!("received SSH_MSG_EXT_INFO with {} extensions", extensions.len());

    let mut ext_info = TheirExtInfo::default();
    for (name, value) in extensions {
        if name == "server-sig-algs" {
            ext_info.auth_pubkey_algo_names = Some(decode_name_list(&value)?);
        }
        log::debug!("received extension {:?}", name);
    }

    st.their_ext_info = ext_info;
    Ok(None)
}

fn decode_name_list(value: &Bytes) -> Result<Vec<String>> {
    use crate::codec::PacketDecode;
    let mut encoded = crate::codec::PacketEncode::new();
    encoded.put_bytes(value);
    PacketDecode::new(encoded.finish()).get_name_list()
}
