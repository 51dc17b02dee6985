//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use prim_im_core::header::{max_value, widths};
use prim_im_core::{AccountId, Msg, MsgType, GROUP_ID_THRESHOLD, MAX_EXTENSION_LEN, MAX_SEQ_NUM};

/// Generate a user account id.
pub fn account_id() -> impl Strategy<Value = AccountId> {
    1..GROUP_ID_THRESHOLD
}

/// Generate a group id.
pub fn group_id() -> impl Strategy<Value = AccountId> {
    GROUP_ID_THRESHOLD..=max_value(widths::ID)
}

/// Generate a receiver: user or group, weighted towards users.
pub fn receiver() -> impl Strategy<Value = AccountId> {
    prop_oneof![4 => account_id(), 1 => group_id()]
}

/// Generate a sequence number, `0` meaning unsequenced.
pub fn seq() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), 1..=MAX_SEQ_NUM]
}

/// Generate a timestamp that fits the header.
pub fn timestamp() -> impl Strategy<Value = u64> {
    0..=max_value(widths::TIMESTAMP)
}

/// Generate a node id.
pub fn node_id() -> impl Strategy<Value = u32> {
    0..=max_value(widths::NODE_ID) as u32
}

/// Generate a MsgType.
pub fn msg_type() -> impl Strategy<Value = MsgType> {
    prop_oneof![
        Just(MsgType::Text),
        Just(MsgType::Meme),
        Just(MsgType::File),
        Just(MsgType::Image),
        Just(MsgType::Video),
        Just(MsgType::Audio),
        Just(MsgType::Ack),
        Just(MsgType::Edit),
        Just(MsgType::Withdraw),
        Just(MsgType::Auth),
        Just(MsgType::Ping),
        Just(MsgType::Echo),
        Just(MsgType::Error),
        Just(MsgType::Sync),
        Just(MsgType::Box),
        Just(MsgType::SystemMessage),
        Just(MsgType::AddFriend),
        Just(MsgType::Noop),
    ]
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate an extension that fits its 6-bit length field.
pub fn extension() -> impl Strategy<Value = Vec<u8>> {
    payload(MAX_EXTENSION_LEN)
}

/// Parameters for generating a frame.
#[derive(Debug, Clone)]
pub struct MsgParams {
    pub typ: MsgType,
    pub sender: AccountId,
    pub receiver: AccountId,
    pub node_id: u32,
    pub timestamp: u64,
    pub seq_num: u64,
    pub payload: Vec<u8>,
    pub extension: Vec<u8>,
}

impl Arbitrary for MsgParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            msg_type(),
            account_id(),
            receiver(),
            node_id(),
            timestamp(),
            seq(),
            payload(512),
            extension(),
        )
            .prop_map(
                |(typ, sender, receiver, node_id, timestamp, seq_num, payload, extension)| {
                    MsgParams {
                        typ,
                        sender,
                        receiver,
                        node_id,
                        timestamp,
                        seq_num,
                        payload,
                        extension,
                    }
                },
            )
            .boxed()
    }
}

/// Build a frame from parameters.
pub fn msg_from_params(params: &MsgParams) -> Msg {
    let mut msg = Msg::build(
        params.typ,
        params.sender,
        params.receiver,
        params.node_id,
        params.timestamp,
        Bytes::from(params.payload.clone()),
        Bytes::from(params.extension.clone()),
    )
    .expect("generated fields fit the header");
    msg.head.seq_num = params.seq_num;
    msg
}
