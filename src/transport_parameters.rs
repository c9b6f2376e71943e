//! Negotiated transport parameters
//!
//! The `TransportParameters` type represents the connection limits each endpoint
//! advertises while establishing a connection: flow control windows, stream
//! counts, timeouts, and migration hints. The serialized form rides inside the
//! handshake and is decoded from untrusted network input, so `read` rejects
//! malformed input deterministically and never returns a partially-populated
//! value. Which parameters are legal depends on who is sending: a client must
//! never emit the server-only parameters, and both `write` and `read` enforce
//! this for the [`Side`] they are given.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;
use tracing::trace;

use crate::{
    coding::{BufExt, BufMutExt, UnexpectedEnd},
    ConnectionId, ResetToken, Side, VarInt, MAX_CID_SIZE, RESET_TOKEN_SIZE,
};

/// Smallest packet size a peer may advertise in `max_packet_size`
const MIN_MAX_PACKET_SIZE: u64 = 1200;
/// Largest legal `ack_delay_exponent`
const MAX_ACK_DELAY_EXPONENT: u64 = 20;

// Apply a given macro to the list of transport parameters carrying a variable-length
// integer value, along with their wire identifiers. This keeps the struct definition,
// the encoder, and the decoder from drifting out of sync.
macro_rules! apply_params {
    ($macro:ident) => {
        $macro! {
            // #[doc] name (id),
            /// Milliseconds a connection may remain idle before the sender closes it
            idle_timeout(IdleTimeout),
            /// Largest UDP payload the sender is willing to receive
            max_packet_size(MaxPacketSize),
            /// Initial limit on the total amount of data that may be sent on the connection
            initial_max_data(InitialMaxData),
            /// Initial flow control limit for locally-initiated bidirectional streams
            initial_max_stream_data_bidi_local(InitialMaxStreamDataBidiLocal),
            /// Initial flow control limit for peer-initiated bidirectional streams
            initial_max_stream_data_bidi_remote(InitialMaxStreamDataBidiRemote),
            /// Initial flow control limit for unidirectional streams
            initial_max_stream_data_uni(InitialMaxStreamDataUni),
            /// Maximum number of bidirectional streams the peer may initiate
            initial_max_streams_bidi(InitialMaxStreamsBidi),
            /// Maximum number of unidirectional streams the peer may initiate
            initial_max_streams_uni(InitialMaxStreamsUni),
            /// Exponent used to decode the ACK delay field in ACK frames
            ack_delay_exponent(AckDelayExponent),
            /// Maximum milliseconds by which the sender will delay acknowledgments
            max_ack_delay(MaxAckDelay),
            /// Maximum number of connection IDs from the peer the sender is willing to store
            active_connection_id_limit(ActiveConnectionIdLimit),
        }
    };
}

macro_rules! make_struct {
    {$($(#[$doc:meta])* $name:ident ($id:ident),)*} => {
        /// Transport parameters used to negotiate connection-level limits between peers
        ///
        /// An absent optional parameter means the sender voiced no opinion. The codec
        /// never substitutes defaults, so absence survives a round trip; interpreting a
        /// missing parameter is left to the transport layer consuming the value.
        #[derive(Debug, Clone, Default, Eq, PartialEq)]
        pub struct TransportParameters {
            $($(#[$doc])* pub $name: Option<VarInt>,)*

            /// Whether the sender rejects connection migration
            pub disable_migration: bool,
            /// The connection ID from the client's first packet, echoed by the server
            /// after a stateless retry; server-only
            pub original_connection_id: Option<ConnectionId>,
            /// Token used by the client to authenticate a stateless reset from the
            /// server; server-only
            pub stateless_reset_token: Option<ResetToken>,
            /// The server's preferred address for communication after the handshake;
            /// server-only
            pub preferred_address: Option<PreferredAddress>,
            /// Protocol version the sender attempted or negotiated
            pub version: Option<u32>,
            /// Version labels the server is also willing to speak
            pub supported_versions: Vec<u32>,
            /// Legacy vendor handshake message, carried verbatim and never interpreted
            pub legacy_message: Option<Bytes>,
        }
    }
}

apply_params!(make_struct);

/// A server's preferred address
///
/// Advertises an alternate address for the peer to migrate to after the
/// handshake, together with the connection ID and reset token to use there.
/// Either address may be unspecified, but the structure is present or absent
/// as a whole.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PreferredAddress {
    /// IPv4 address and port, all-zero when not offered
    pub address_v4: SocketAddrV4,
    /// IPv6 address and port, all-zero when not offered
    pub address_v6: SocketAddrV6,
    /// Connection ID to use when migrating to the preferred address
    pub connection_id: ConnectionId,
    /// Reset token associated with the preferred address
    pub stateless_reset_token: ResetToken,
}

impl PreferredAddress {
    fn wire_size(&self) -> u16 {
        4 + 2 + 16 + 2 + 1 + self.connection_id.len() as u16 + RESET_TOKEN_SIZE as u16
    }

    fn write<W: BufMut>(&self, w: &mut W) {
        w.write(*self.address_v4.ip());
        w.write::<u16>(self.address_v4.port());
        w.write(*self.address_v6.ip());
        w.write::<u16>(self.address_v6.port());
        w.write::<u8>(self.connection_id.len() as u8);
        w.put_slice(&self.connection_id);
        w.put_slice(&self.stateless_reset_token);
    }

    fn read<R: Buf>(r: &mut R) -> Result<Self, Error> {
        let ip_v4 = r.get::<Ipv4Addr>()?;
        let port_v4 = r.get::<u16>()?;
        let ip_v6 = r.get::<Ipv6Addr>()?;
        let port_v6 = r.get::<u16>()?;
        let cid_len = r.get::<u8>()? as usize;
        // The declared parameter length must account for the embedded connection ID
        // length exactly; a shortfall or leftover is a malformed composite
        if cid_len > MAX_CID_SIZE || r.remaining() != cid_len + RESET_TOKEN_SIZE {
            return Err(Error::Malformed);
        }
        let mut stage = [0; MAX_CID_SIZE];
        r.copy_to_slice(&mut stage[..cid_len]);
        let connection_id = ConnectionId::new(&stage[..cid_len]);
        let mut token = [0; RESET_TOKEN_SIZE];
        r.copy_to_slice(&mut token);
        Ok(Self {
            address_v4: SocketAddrV4::new(ip_v4, port_v4),
            address_v6: SocketAddrV6::new(ip_v6, port_v6, 0, 0),
            connection_id,
            stateless_reset_token: token.into(),
        })
    }
}

/// Errors encountered while encoding or decoding `TransportParameters`
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum Error {
    /// The input ended before the declared length of an entry was satisfied
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// A known parameter appeared more than once
    #[error("duplicate transport parameter {0:?}")]
    DuplicateParameter(ParameterId),
    /// A parameter the sending side must not send was present in the input
    #[error("unexpected transport parameter {0:?}")]
    UnexpectedField(ParameterId),
    /// A value's internal structure contradicted its declared length
    #[error("malformed transport parameter value")]
    Malformed,
    /// A parameter carried a semantically illegal value
    #[error("transport parameter had illegal value")]
    IllegalValue,
    /// Refused to encode a parameter the local side must not send
    #[error("refusing to send transport parameter {0:?}")]
    ForbiddenField(ParameterId),
}

impl From<UnexpectedEnd> for Error {
    fn from(_: UnexpectedEnd) -> Self {
        // Only reachable inside a length-delimited value whose outer length was
        // already verified, so a short read here is a structural mismatch rather
        // than truncated input
        Self::Malformed
    }
}

impl TransportParameters {
    /// Encode these parameters as sent by `side`
    ///
    /// Validates first; nothing is written to `w` on failure.
    pub fn write<W: BufMut>(&self, side: Side, w: &mut W) -> Result<(), Error> {
        self.validate(side)?;
        let mut body = Vec::new();
        for id in ParameterId::SUPPORTED {
            match id {
                ParameterId::OriginalConnectionId => {
                    if let Some(ref cid) = self.original_connection_id {
                        body.put_u16(id as u16);
                        body.put_u16(cid.len() as u16);
                        body.put_slice(cid);
                    }
                }
                ParameterId::StatelessResetToken => {
                    if let Some(ref token) = self.stateless_reset_token {
                        body.put_u16(id as u16);
                        body.put_u16(RESET_TOKEN_SIZE as u16);
                        body.put_slice(token);
                    }
                }
                ParameterId::DisableMigration => {
                    if self.disable_migration {
                        body.put_u16(id as u16);
                        body.put_u16(0);
                    }
                }
                ParameterId::PreferredAddress => {
                    if let Some(ref addr) = self.preferred_address {
                        body.put_u16(id as u16);
                        body.put_u16(addr.wire_size());
                        addr.write(&mut body);
                    }
                }
                ParameterId::LegacyMessage => {
                    if let Some(ref msg) = self.legacy_message {
                        let len = u16::try_from(msg.len()).map_err(|_| Error::IllegalValue)?;
                        body.put_u16(id as u16);
                        body.put_u16(len);
                        body.put_slice(msg);
                    }
                }
                ParameterId::VersionInfo => {
                    if let Some(version) = self.version {
                        let count = self.supported_versions.len();
                        if count > usize::from(u8::MAX) / 4 {
                            return Err(Error::IllegalValue);
                        }
                        body.put_u16(id as u16);
                        if count == 0 {
                            // A bare requested version, as a client sends it
                            body.put_u16(4);
                            body.put_u32(version);
                        } else {
                            body.put_u16((5 + 4 * count) as u16);
                            body.put_u32(version);
                            body.put_u8((4 * count) as u8);
                            for &label in &self.supported_versions {
                                body.put_u32(label);
                            }
                        }
                    }
                }
                id => {
                    macro_rules! write_params {
                        {$($(#[$doc:meta])* $name:ident ($id:ident),)*} => {
                            match id {
                                $(ParameterId::$id => {
                                    if let Some(value) = self.$name {
                                        body.put_u16(id as u16);
                                        body.put_u16(value.size() as u16);
                                        body.write(value);
                                    }
                                })*
                                _ => unreachable!("registry entry without an encode rule"),
                            }
                        }
                    }
                    apply_params!(write_params);
                }
            }
        }
        let total = u16::try_from(body.len()).map_err(|_| Error::IllegalValue)?;
        w.put_u16(total);
        w.put_slice(&body);
        Ok(())
    }

    /// Decode parameters received from the peer of `side`
    ///
    /// `side` is the role of the endpoint doing the decoding: a client decodes
    /// what the server sent and vice versa, and the server-only parameters are
    /// rejected when the bytes came from a client. Unknown parameter identifiers
    /// are skipped for forward compatibility; every other irregularity is fatal
    /// for the whole decode.
    pub fn read<R: Buf>(side: Side, r: &mut R) -> Result<Self, Error> {
        if r.remaining() < 2 {
            return Err(Error::UnexpectedEnd);
        }
        let total = r.get_u16() as usize;
        if total > r.remaining() {
            return Err(Error::UnexpectedEnd);
        }
        if total < r.remaining() {
            return Err(Error::Malformed);
        }

        let mut params = Self::default();
        while r.has_remaining() {
            if r.remaining() < 4 {
                return Err(Error::UnexpectedEnd);
            }
            let raw = r.get_u16();
            let len = r.get_u16() as usize;
            if r.remaining() < len {
                return Err(Error::UnexpectedEnd);
            }
            let Ok(id) = ParameterId::try_from(raw) else {
                // Unknown parameters are ignored
                trace!(id = raw, len, "skipping unknown transport parameter");
                r.advance(len);
                continue;
            };
            if side.is_server() && id.server_only() {
                return Err(Error::UnexpectedField(id));
            }

            match id {
                ParameterId::OriginalConnectionId => {
                    decode_cid(id, len, &mut params.original_connection_id, r)?
                }
                ParameterId::StatelessResetToken => {
                    if params.stateless_reset_token.is_some() {
                        return Err(Error::DuplicateParameter(id));
                    }
                    if len != RESET_TOKEN_SIZE {
                        return Err(Error::Malformed);
                    }
                    let mut token = [0; RESET_TOKEN_SIZE];
                    r.copy_to_slice(&mut token);
                    params.stateless_reset_token = Some(token.into());
                }
                ParameterId::DisableMigration => {
                    if params.disable_migration {
                        return Err(Error::DuplicateParameter(id));
                    }
                    if len != 0 {
                        return Err(Error::Malformed);
                    }
                    params.disable_migration = true;
                }
                ParameterId::PreferredAddress => {
                    if params.preferred_address.is_some() {
                        return Err(Error::DuplicateParameter(id));
                    }
                    params.preferred_address = Some(PreferredAddress::read(&mut r.take(len))?);
                }
                ParameterId::LegacyMessage => {
                    if params.legacy_message.is_some() {
                        return Err(Error::DuplicateParameter(id));
                    }
                    params.legacy_message = Some(r.copy_to_bytes(len));
                }
                ParameterId::VersionInfo => {
                    if params.version.is_some() {
                        return Err(Error::DuplicateParameter(id));
                    }
                    params.read_version_info(len, r)?;
                }
                id => {
                    macro_rules! parse {
                        {$($(#[$doc:meta])* $name:ident ($id:ident),)*} => {
                            match id {
                                $(ParameterId::$id => {
                                    if params.$name.is_some() {
                                        return Err(Error::DuplicateParameter(id));
                                    }
                                    // Decoding from a bounded view keeps a varint whose
                                    // length class overruns the entry from touching the
                                    // next entry's header
                                    let value = r.take(len).get::<VarInt>()?;
                                    if value.size() != len {
                                        return Err(Error::Malformed);
                                    }
                                    params.$name = Some(value);
                                })*
                                _ => unreachable!("registry entry without a decode rule"),
                            }
                        }
                    }
                    apply_params!(parse);
                }
            }
        }

        // The loop already rejected parameters illegal for the sending direction;
        // range rules still apply to whatever the peer sent
        params.validate(!side)?;
        Ok(params)
    }

    /// Check the range and perspective invariants for parameters sent by `origin`
    ///
    /// Pure. Run by `write` before emitting anything and by `read` before
    /// returning; also available to callers populating parameters from local
    /// configuration.
    pub fn validate(&self, origin: Side) -> Result<(), Error> {
        if self
            .max_packet_size
            .is_some_and(|x| x.into_inner() < MIN_MAX_PACKET_SIZE)
        {
            return Err(Error::IllegalValue);
        }
        if self
            .ack_delay_exponent
            .is_some_and(|x| x.into_inner() > MAX_ACK_DELAY_EXPONENT)
        {
            return Err(Error::IllegalValue);
        }
        // The supported-version list rides inside the version-info entry, which
        // is only emitted when `version` is set; a list without a version has no
        // wire representation
        if self.version.is_none() && !self.supported_versions.is_empty() {
            return Err(Error::IllegalValue);
        }
        if origin.is_client() {
            if self.original_connection_id.is_some() {
                return Err(Error::ForbiddenField(ParameterId::OriginalConnectionId));
            }
            if self.stateless_reset_token.is_some() {
                return Err(Error::ForbiddenField(ParameterId::StatelessResetToken));
            }
            if self.preferred_address.is_some() {
                return Err(Error::ForbiddenField(ParameterId::PreferredAddress));
            }
        }
        Ok(())
    }

    /// Whether `validate` succeeds for parameters sent by `origin`
    pub fn is_valid(&self, origin: Side) -> bool {
        self.validate(origin).is_ok()
    }

    fn read_version_info<R: Buf>(&mut self, len: usize, r: &mut R) -> Result<(), Error> {
        if len < 4 {
            return Err(Error::Malformed);
        }
        self.version = Some(r.get::<u32>()?);
        if len == 4 {
            // A client's version info carries only the version it attempted
            return Ok(());
        }
        let list_len = usize::from(r.get::<u8>()?);
        if list_len == 0 || list_len % 4 != 0 || len != 5 + list_len {
            return Err(Error::Malformed);
        }
        for _ in 0..list_len / 4 {
            self.supported_versions.push(r.get::<u32>()?);
        }
        Ok(())
    }
}

/// Registry of known transport parameter identifiers
///
/// Each identifier fixes the grammar of its value: a variable-length integer,
/// an opaque byte string, a zero-length flag, or a composite structure.
/// `SUPPORTED` doubles as the serialization order.
#[repr(u16)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ParameterId {
    /// Opaque connection ID, 0-20 bytes; server-only
    OriginalConnectionId = 0x0000,
    /// Variable-length integer, milliseconds
    IdleTimeout = 0x0001,
    /// Opaque, exactly 16 bytes; server-only
    StatelessResetToken = 0x0002,
    /// Variable-length integer, bytes
    MaxPacketSize = 0x0003,
    /// Variable-length integer, bytes
    InitialMaxData = 0x0004,
    /// Variable-length integer, bytes
    InitialMaxStreamDataBidiLocal = 0x0005,
    /// Variable-length integer, bytes
    InitialMaxStreamDataBidiRemote = 0x0006,
    /// Variable-length integer, bytes
    InitialMaxStreamDataUni = 0x0007,
    /// Variable-length integer, stream count
    InitialMaxStreamsBidi = 0x0008,
    /// Variable-length integer, stream count
    InitialMaxStreamsUni = 0x0009,
    /// Variable-length integer, at most 20
    AckDelayExponent = 0x000a,
    /// Variable-length integer, milliseconds
    MaxAckDelay = 0x000b,
    /// Zero-length flag
    DisableMigration = 0x000c,
    /// Composite preferred-address structure; server-only
    PreferredAddress = 0x000d,
    /// Variable-length integer, connection ID count
    ActiveConnectionIdLimit = 0x000e,
    /// Opaque legacy handshake message, uninterpreted
    LegacyMessage = 0x4751,
    /// Requested version, optionally followed by the supported version list
    VersionInfo = 0x4752,
}

impl ParameterId {
    /// All registered identifiers, in serialization order
    const SUPPORTED: [Self; 17] = [
        Self::OriginalConnectionId,
        Self::IdleTimeout,
        Self::StatelessResetToken,
        Self::MaxPacketSize,
        Self::InitialMaxData,
        Self::InitialMaxStreamDataBidiLocal,
        Self::InitialMaxStreamDataBidiRemote,
        Self::InitialMaxStreamDataUni,
        Self::InitialMaxStreamsBidi,
        Self::InitialMaxStreamsUni,
        Self::AckDelayExponent,
        Self::MaxAckDelay,
        Self::DisableMigration,
        Self::PreferredAddress,
        Self::ActiveConnectionIdLimit,
        Self::LegacyMessage,
        Self::VersionInfo,
    ];

    /// Whether only a server may send this parameter
    fn server_only(self) -> bool {
        matches!(
            self,
            Self::OriginalConnectionId | Self::StatelessResetToken | Self::PreferredAddress
        )
    }
}

impl TryFrom<u16> for ParameterId {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, ()> {
        Self::SUPPORTED
            .into_iter()
            .find(|&id| id as u16 == value)
            .ok_or(())
    }
}

fn decode_cid(
    id: ParameterId,
    len: usize,
    value: &mut Option<ConnectionId>,
    r: &mut impl Buf,
) -> Result<(), Error> {
    if value.is_some() {
        return Err(Error::DuplicateParameter(id));
    }
    if len > MAX_CID_SIZE {
        return Err(Error::Malformed);
    }
    *value = Some(ConnectionId::from_buf(r, len));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    const FAKE_VERSION: u32 = 0x01234567;
    const FAKE_VERSION_2: u32 = 0x89abcdef;

    fn client_params() -> TransportParameters {
        TransportParameters {
            idle_timeout: Some(12012u32.into()),
            max_packet_size: Some(9001u32.into()),
            initial_max_data: Some(101u32.into()),
            initial_max_stream_data_bidi_local: Some(2001u32.into()),
            initial_max_stream_data_bidi_remote: Some(2002u32.into()),
            initial_max_stream_data_uni: Some(3000u32.into()),
            initial_max_streams_bidi: Some(21u32.into()),
            initial_max_streams_uni: Some(22u32.into()),
            ack_delay_exponent: Some(10u32.into()),
            max_ack_delay: Some(51u32.into()),
            disable_migration: true,
            active_connection_id_limit: Some(52u32.into()),
            version: Some(FAKE_VERSION),
            ..TransportParameters::default()
        }
    }

    fn server_params() -> TransportParameters {
        TransportParameters {
            original_connection_id: Some(ConnectionId::new(&hex!("0000000000001337"))),
            stateless_reset_token: Some(hex!("909192939495969798999a9b9c9d9e9f").into()),
            preferred_address: Some(PreferredAddress {
                address_v4: SocketAddrV4::new(Ipv4Addr::new(65, 66, 67, 68), 0x4884),
                address_v6: SocketAddrV6::new(
                    Ipv6Addr::new(0x6061, 0x6263, 0x6465, 0x6667, 0x6869, 0x6a6b, 0x6c6d, 0x6e6f),
                    0x6336,
                    0,
                    0,
                ),
                connection_id: ConnectionId::new(&hex!("000000000000beef")),
                stateless_reset_token: hex!("808182838485868788898a8b8c8d8e8f").into(),
            }),
            supported_versions: vec![FAKE_VERSION, FAKE_VERSION_2],
            ..client_params()
        }
    }

    const CLIENT_PARAMS_WIRE: &[u8] = &hex!(
        "0049
         0001 0002 6eec
         0003 0002 6329
         0004 0002 4065
         0005 0002 47d1
         0006 0002 47d2
         0007 0002 4bb8
         0008 0001 15
         0009 0001 16
         000a 0001 0a
         000b 0001 33
         000c 0000
         000e 0001 34
         4752 0004 01234567"
    );

    const SERVER_PARAMS_WIRE: &[u8] = &hex!(
        "00a7
         0000 0008 0000000000001337
         0001 0002 6eec
         0002 0010 909192939495969798999a9b9c9d9e9f
         0003 0002 6329
         0004 0002 4065
         0005 0002 47d1
         0006 0002 47d2
         0007 0002 4bb8
         0008 0001 15
         0009 0001 16
         000a 0001 0a
         000b 0001 33
         000c 0000
         000d 0031
              41424344 4884
              606162636465666768696a6b6c6d6e6f 6336
              08 000000000000beef
              808182838485868788898a8b8c8d8e8f
         000e 0001 34
         4752 000d 01234567 08 01234567 89abcdef"
    );

    fn encode(side: Side, params: &TransportParameters) -> Vec<u8> {
        let mut buf = Vec::new();
        params.write(side, &mut buf).unwrap();
        buf
    }

    fn decode(side: Side, mut bytes: &[u8]) -> Result<TransportParameters, Error> {
        TransportParameters::read(side, &mut bytes)
    }

    #[test]
    fn client_params_reference_vector() {
        let params = client_params();
        assert_eq!(encode(Side::Client, &params), CLIENT_PARAMS_WIRE);
        assert_eq!(decode(Side::Server, CLIENT_PARAMS_WIRE).unwrap(), params);
    }

    #[test]
    fn server_params_reference_vector() {
        let params = server_params();
        assert_eq!(encode(Side::Server, &params), SERVER_PARAMS_WIRE);
        assert_eq!(decode(Side::Client, SERVER_PARAMS_WIRE).unwrap(), params);
    }

    #[test]
    fn empty_round_trip() {
        let params = TransportParameters::default();
        let buf = encode(Side::Client, &params);
        assert_eq!(buf, hex!("0000"));
        assert_eq!(decode(Side::Server, &buf).unwrap(), params);
    }

    #[test]
    fn preferred_address_round_trip() {
        // The structure survives even when one address is unspecified
        let params = TransportParameters {
            preferred_address: Some(PreferredAddress {
                address_v4: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
                address_v6: SocketAddrV6::new(Ipv6Addr::LOCALHOST, 24, 0, 0),
                connection_id: ConnectionId::new(&[]),
                stateless_reset_token: [0xab; RESET_TOKEN_SIZE].into(),
            }),
            ..TransportParameters::default()
        };
        let buf = encode(Side::Server, &params);
        assert_eq!(decode(Side::Client, &buf).unwrap(), params);
    }

    #[test]
    fn validate_max_packet_size_bounds() {
        let mut params = TransportParameters::default();
        assert!(params.is_valid(Side::Client));
        for (value, valid) in [
            (0u32, false),
            (1199, false),
            (1200, true),
            (65535, true),
            (9_999_999, true),
        ] {
            params.max_packet_size = Some(value.into());
            assert_eq!(params.is_valid(Side::Client), valid, "max_packet_size {value}");
        }
    }

    #[test]
    fn validate_ack_delay_exponent_bounds() {
        let mut params = TransportParameters::default();
        for (value, valid) in [(0u32, true), (10, true), (20, true), (21, false)] {
            params.ack_delay_exponent = Some(value.into());
            assert_eq!(
                params.is_valid(Side::Client),
                valid,
                "ack_delay_exponent {value}"
            );
        }
    }

    #[test]
    fn supported_versions_require_a_version() {
        // A supported-version list with no requested version has no wire form,
        // so encoding it would silently drop the list
        let params = TransportParameters {
            supported_versions: vec![FAKE_VERSION, FAKE_VERSION_2],
            ..TransportParameters::default()
        };
        assert!(!params.is_valid(Side::Server));
        let mut buf = Vec::new();
        assert_matches!(params.write(Side::Server, &mut buf), Err(Error::IllegalValue));
        assert!(buf.is_empty());
    }

    #[test]
    fn client_must_not_send_server_only_params() {
        let params = TransportParameters {
            idle_timeout: Some(12012u32.into()),
            stateless_reset_token: Some([0x9a; RESET_TOKEN_SIZE].into()),
            ..TransportParameters::default()
        };
        let mut buf = Vec::new();
        assert_matches!(
            params.write(Side::Client, &mut buf),
            Err(Error::ForbiddenField(ParameterId::StatelessResetToken))
        );
        // Nothing may be emitted on failure
        assert!(buf.is_empty());
        // The same parameters are legal for a server to send
        assert!(params.write(Side::Server, &mut buf).is_ok());
    }

    #[test]
    fn perspective_governs_legality_of_same_bytes() {
        let wire = hex!("0014 0002 0010 909192939495969798999a9b9c9d9e9f");
        // Legal from a server, so a client-side decoder accepts it
        let params = decode(Side::Client, &wire).unwrap();
        assert_eq!(
            params.stateless_reset_token,
            Some(hex!("909192939495969798999a9b9c9d9e9f").into())
        );
        // A client must never send it, so a server-side decoder rejects it
        assert_matches!(
            decode(Side::Server, &wire),
            Err(Error::UnexpectedField(ParameterId::StatelessResetToken))
        );
    }

    #[test]
    fn duplicate_parameter_rejected() {
        // Values agreeing or not makes no difference
        let wire = hex!("000b 0001 0002 6eec 0001 0001 2a");
        assert_matches!(
            decode(Side::Server, &wire),
            Err(Error::DuplicateParameter(ParameterId::IdleTimeout))
        );
    }

    #[test]
    fn duplicate_flag_rejected() {
        let wire = hex!("0008 000c 0000 000c 0000");
        assert_matches!(
            decode(Side::Server, &wire),
            Err(Error::DuplicateParameter(ParameterId::DisableMigration))
        );
    }

    #[test]
    fn every_truncation_detected() {
        for i in 0..SERVER_PARAMS_WIRE.len() {
            assert_matches!(
                decode(Side::Client, &SERVER_PARAMS_WIRE[..i]),
                Err(Error::UnexpectedEnd),
                "prefix of {i} bytes"
            );
        }
    }

    #[test]
    fn truncated_entry_value_detected() {
        // Entry header declares two value bytes, none remain
        assert_matches!(
            decode(Side::Server, &hex!("0004 0001 0002")),
            Err(Error::UnexpectedEnd)
        );
    }

    #[test]
    fn trailing_input_rejected() {
        assert_matches!(
            decode(Side::Server, &hex!("0000 ff")),
            Err(Error::Malformed)
        );
    }

    #[test]
    fn unknown_parameters_skipped() {
        // An unregistered id with arbitrary contents sits between two known entries
        let wire = hex!("0013 0001 0002 6eec 4321 0003 aabbcc 0003 0002 6329");
        let params = decode(Side::Server, &wire).unwrap();
        assert_eq!(params.idle_timeout, Some(12012u32.into()));
        assert_eq!(params.max_packet_size, Some(9001u32.into()));
    }

    #[test]
    fn varint_length_mismatch_rejected() {
        // A one-byte varint inside an entry declaring two value bytes
        assert_matches!(
            decode(Side::Server, &hex!("0006 0001 0002 2a00")),
            Err(Error::Malformed)
        );
    }

    #[test]
    fn varint_overrunning_entry_rejected() {
        // The value byte's length class claims two bytes but the entry declares
        // one; the following entry must play no part in the outcome
        let wire = hex!("000a 0001 0001 40 000a 0001 0a");
        assert_matches!(decode(Side::Server, &wire), Err(Error::Malformed));
    }

    #[test]
    fn reset_token_wrong_length_rejected() {
        assert_matches!(
            decode(Side::Client, &hex!("0008 0002 0004 90919293")),
            Err(Error::Malformed)
        );
    }

    #[test]
    fn connection_id_too_long_rejected() {
        let wire = hex!("0019 0000 0015 000102030405060708090a0b0c0d0e0f1011121314");
        assert_matches!(decode(Side::Client, &wire), Err(Error::Malformed));
    }

    #[test]
    fn preferred_address_length_mismatch_rejected() {
        // One spare byte between the connection ID and the token positions
        let wire = hex!(
            "0036 000d 0032
             41424344 4884
             606162636465666768696a6b6c6d6e6f 6336
             08 000000000000beef
             00
             808182838485868788898a8b8c8d8e8f"
        );
        assert_matches!(decode(Side::Client, &wire), Err(Error::Malformed));
    }

    #[test]
    fn version_list_length_mismatch_rejected() {
        // List length byte promises eight bytes of labels but only seven follow
        let wire = hex!("0010 4752 000c 01234567 08 01234567 89abcd");
        assert_matches!(decode(Side::Client, &wire), Err(Error::Malformed));
        // List length byte is not a whole number of labels
        let wire = hex!("000f 4752 000b 01234567 06 01234567 89ab");
        assert_matches!(decode(Side::Client, &wire), Err(Error::Malformed));
    }

    #[test]
    fn decode_applies_range_rules() {
        // ack_delay_exponent of 21 is well-formed on the wire but semantically illegal
        assert_matches!(
            decode(Side::Client, &hex!("0005 000a 0001 15")),
            Err(Error::IllegalValue)
        );
    }

    #[test]
    fn legacy_message_round_trip() {
        const LEGACY_BLOB: &[u8] = &hex!("43484c4f 02000000 2a000000 0b000000 74657374");
        let params = TransportParameters {
            max_packet_size: Some(9001u32.into()),
            version: Some(FAKE_VERSION),
            legacy_message: Some(Bytes::from_static(LEGACY_BLOB)),
            ..TransportParameters::default()
        };
        let buf = encode(Side::Client, &params);
        let decoded = decode(Side::Server, &buf).unwrap();
        assert_eq!(decoded, params);
        assert_eq!(decoded.legacy_message, params.legacy_message);
    }
}
