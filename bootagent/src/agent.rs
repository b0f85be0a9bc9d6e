//! The receive, dispatch and reply loop.

use crate::dispatcher::{Dispatcher, Outcome};
use crate::error::Result;
use crate::flash::FlashAdapter;
use crate::hooks::{Hooks, NoHooks};
use crate::protocol::frame::{CHECKSUM_LEN, HEADER_LEN};
use crate::protocol::table::MAX_PAYLOAD;
use crate::protocol::{Codec, ProtocolConfig, ResponseFrame};
use crate::session::Session;
use crate::transport::Transport;
use log::{debug, info, warn};

/// Largest request frame on the wire.
const MAX_FRAME: usize = HEADER_LEN + MAX_PAYLOAD + CHECKSUM_LEN;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Start the application at `address`.
    Run {
        /// Entry address.
        address: u32,
    },
    /// Reset the device.
    Reset,
}

impl Handoff {
    /// Carry out the handoff on `platform`.
    ///
    /// On a device neither branch returns. If a jump ever comes back the
    /// device is reset instead of resuming the loop.
    pub fn perform<P: Platform + ?Sized>(self, platform: &mut P) {
        match self {
            Self::Run { address } => {
                platform.release_peripherals();
                platform.jump(address);
                warn!("Application at {address:#010x} returned, resetting");
                platform.reset();
            },
            Self::Reset => platform.reset(),
        }
    }
}

/// Control transfer primitives of the device the agent runs on.
pub trait Platform {
    /// Disable every peripheral the agent enabled. Must be idempotent.
    fn release_peripherals(&mut self);

    /// Branch to the application image at `address`.
    fn jump(&mut self, address: u32);

    /// Reset the device.
    fn reset(&mut self);
}

/// The boot agent: one transport, one flash device, one session.
#[derive(Debug)]
pub struct Agent<T, F, H = NoHooks> {
    transport: T,
    codec: Codec,
    dispatcher: Dispatcher<F, H>,
    session: Session,
}

impl<T: Transport, F: FlashAdapter> Agent<T, F> {
    /// Create an agent without hooks.
    pub fn new(transport: T, flash: F, config: ProtocolConfig) -> Self {
        let dispatcher = Dispatcher::new(flash).with_status_id(config.status_id);
        Self::with_dispatcher(transport, dispatcher, config)
    }
}

impl<T: Transport, F: FlashAdapter, H: Hooks> Agent<T, F, H> {
    /// Create an agent around a configured dispatcher.
    pub fn with_dispatcher(
        transport: T,
        dispatcher: Dispatcher<F, H>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            transport,
            codec: Codec::new(config),
            dispatcher,
            session: Session::new(),
        }
    }

    /// Current session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The dispatcher, for access to flash and hooks.
    pub fn dispatcher(&self) -> &Dispatcher<F, H> {
        &self.dispatcher
    }

    /// The dispatcher, mutably.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<F, H> {
        &mut self.dispatcher
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start a fresh session, as after a device reset.
    pub fn reset_session(&mut self) {
        self.session = Session::new();
    }

    /// Take the transport and dispatcher back.
    pub fn into_parts(self) -> (T, Dispatcher<F, H>) {
        (self.transport, self.dispatcher)
    }

    /// Serve frames until the host asks to run an image or reset.
    ///
    /// Malformed frames are answered with a NAK and do not end the loop.
    /// Transport failures do.
    pub fn serve(&mut self) -> Result<Handoff> {
        info!("Waiting for host");
        loop {
            match self.step()? {
                Outcome::Continue => {},
                Outcome::Run { address } => return Ok(Handoff::Run { address }),
                Outcome::Reset => return Ok(Handoff::Reset),
            }
        }
    }

    /// Receive, handle and answer exactly one frame.
    pub fn step(&mut self) -> Result<Outcome> {
        let mut header = [0u8; HEADER_LEN];
        self.transport
            .receive(&mut header)?;
        let (id, command, selector) = self
            .codec
            .parse_header(&header);
        let mut frame = [0u8; MAX_FRAME];
        frame[..HEADER_LEN].copy_from_slice(&header);

        let (reply, outcome) = match self
            .codec
            .frame_len(&header)
        {
            Err(e) => {
                // Unknown shape: only the checksum can be assumed to follow.
                self.transport
                    .receive(&mut frame[HEADER_LEN..HEADER_LEN + CHECKSUM_LEN])?;
                warn!("Rejected frame: {e}");
                (ResponseFrame::nak(id, command, selector), Outcome::Continue)
            },
            Ok(len) => {
                self.transport
                    .receive(&mut frame[HEADER_LEN..len])?;
                match self
                    .codec
                    .decode(&frame[..len])
                {
                    Ok(request) => {
                        let dispatch = self
                            .dispatcher
                            .handle(&mut self.session, &request);
                        (dispatch.reply, dispatch.outcome)
                    },
                    Err(e) => {
                        warn!("Rejected frame: {e}");
                        (ResponseFrame::nak(id, command, selector), Outcome::Continue)
                    },
                }
            },
        };

        let bytes = self
            .codec
            .encode(&reply);
        self.transport
            .send(&bytes)?;
        if outcome.is_terminal() {
            self.transport
                .flush()?;
            debug!("Reply flushed before {outcome:?}");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::flash::{FlashLayout, MemoryFlash};
    use crate::protocol::checksum::ChecksumMode;
    use crate::protocol::table::{CMD_TRANSFER, SEL_WRITE_INFO};
    use crate::protocol::{ACK, NAK, Request, Status};
    use crate::transport::StreamTransport;
    use std::collections::VecDeque;

    struct MockSerial {
        read_buf: VecDeque<u8>,
        write_buf: Vec<u8>,
        flushes: usize,
    }

    impl MockSerial {
        fn new(input: &[u8]) -> Self {
            Self {
                read_buf: input
                    .iter()
                    .copied()
                    .collect(),
                write_buf: Vec::new(),
                flushes: 0,
            }
        }
    }

    impl std::io::Read for MockSerial {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf
                .len()
                .min(self.read_buf.len());
            for (slot, byte) in buf
                .iter_mut()
                .zip(self.read_buf.drain(..n))
            {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl std::io::Write for MockSerial {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.write_buf
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn layout() -> FlashLayout {
        FlashLayout {
            size: 0x8000,
            page_size: 1024,
            app_start: 0x1000,
            reserved: 0,
            allow_agent_update: false,
        }
    }

    fn agent(
        input: &[u8],
        config: ProtocolConfig,
    ) -> Agent<StreamTransport<MockSerial>, MemoryFlash> {
        Agent::new(
            StreamTransport::new(MockSerial::new(input)).with_interrupt_check(|| false),
            MemoryFlash::new(layout()).unwrap(),
            config,
        )
    }

    fn replies(agent: &Agent<StreamTransport<MockSerial>, MemoryFlash>) -> Vec<Vec<u8>> {
        agent
            .transport()
            .get_ref()
            .write_buf
            .chunks(8)
            .map(<[u8]>::to_vec)
            .collect()
    }

    fn wire(codec: &Codec, requests: &[Request]) -> Vec<u8> {
        requests
            .iter()
            .flat_map(|r| {
                codec
                    .encode_typed(0x01, r)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_full_transfer_then_run() {
        let codec = Codec::default();
        let input = wire(
            &codec,
            &[
                Request::Handshake,
                Request::WriteInfo {
                    address: 0x1000,
                    size: 256,
                },
                Request::WriteBin { block: [0x11; 128] },
                Request::WriteBin { block: [0x22; 128] },
                Request::StatusQuery,
                Request::Run { address: 0x1000 },
            ],
        );
        let mut agent = agent(&input, ProtocolConfig::default());

        let handoff = agent
            .serve()
            .unwrap();
        assert_eq!(handoff, Handoff::Run { address: 0x1000 });

        let replies = replies(&agent);
        assert_eq!(replies.len(), 6);
        assert_eq!(
            replies[0],
            vec![0x01, 0x00, 0x60, 0x01, ACK, 0x00, 0x11, 0x22]
        );
        for reply in &replies[1..4] {
            assert_eq!(reply[4..6], [ACK, Status::Success.code()]);
        }
        assert_eq!(
            replies[4],
            vec![0x21, 0x03, 0x00, 0x06, 0x40, 0x00, 0x11, 0x22]
        );
        assert_eq!(replies[5][2..4], [0x60, 0x02]);
        assert_eq!(
            agent
                .transport()
                .get_ref()
                .flushes,
            1
        );
        assert_eq!(
            agent
                .dispatcher()
                .flash()
                .read(0x1000, 256)
                .unwrap(),
            [[0x11; 128], [0x22; 128]].concat()
        );
    }

    #[test]
    fn test_exit_returns_reset() {
        let codec = Codec::default();
        let mut agent = agent(&wire(&codec, &[Request::Exit]), ProtocolConfig::default());
        assert_eq!(
            agent
                .serve()
                .unwrap(),
            Handoff::Reset
        );
    }

    #[test]
    fn test_unknown_shape_is_nacked_and_loop_continues() {
        let codec = Codec::default();
        let mut input = vec![0x01, 0x05, 0x03, 0x60, 0xAB, 0xCD];
        input.extend(wire(&codec, &[Request::Exit]));
        let mut agent = agent(&input, ProtocolConfig::default());

        assert_eq!(
            agent
                .serve()
                .unwrap(),
            Handoff::Reset
        );
        let replies = replies(&agent);
        assert_eq!(
            replies[0],
            vec![0x01, 0x05, 0x60, 0x03, NAK, 0x00, 0x11, 0x22]
        );
        assert!(replies[1][4] == ACK);
    }

    #[test]
    fn test_checksum_mismatch_is_nacked() {
        let config = ProtocolConfig {
            checksum: ChecksumMode::Sum16,
            ..ProtocolConfig::default()
        };
        let codec = Codec::new(config);
        let mut bad = codec
            .encode_request(0x01, CMD_TRANSFER, SEL_WRITE_INFO, &[0u8; 10])
            .unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 0x01;

        let mut agent = agent(&bad, config);
        assert!(
            agent
                .step()
                .is_ok()
        );
        let replies = replies(&agent);
        assert_eq!(replies[0][4], NAK);
        assert!(
            agent
                .dispatcher()
                .flash()
                .operations()
                .is_empty()
        );
    }

    #[test]
    fn test_disconnect_ends_serve() {
        let codec = Codec::default();
        let mut input = wire(&codec, &[Request::Handshake]);
        input.extend_from_slice(&[0x01, 0x00]);
        let mut agent = agent(&input, ProtocolConfig::default());

        let err = agent
            .serve()
            .unwrap_err();
        assert!(matches!(err, Error::Disconnected));
        assert_eq!(replies(&agent).len(), 1);
    }

    #[test]
    fn test_reset_session_clears_state() {
        let codec = Codec::default();
        let input = wire(
            &codec,
            &[Request::WriteInfo {
                address: 0x1000,
                size: 128,
            }],
        );
        let mut agent = agent(&input, ProtocolConfig::default());
        agent
            .step()
            .unwrap();
        assert_eq!(
            agent
                .session()
                .transfer_remaining,
            128
        );
        agent.reset_session();
        assert_eq!(agent.session(), &Session::new());
    }

    #[derive(Default)]
    struct RecordingPlatform {
        calls: Vec<String>,
    }

    impl Platform for RecordingPlatform {
        fn release_peripherals(&mut self) {
            self.calls
                .push("release".to_string());
        }

        fn jump(&mut self, address: u32) {
            self.calls
                .push(format!("jump {address:#x}"));
        }

        fn reset(&mut self) {
            self.calls
                .push("reset".to_string());
        }
    }

    #[test]
    fn test_run_handoff_resets_if_jump_returns() {
        let mut platform = RecordingPlatform::default();
        Handoff::Run { address: 0x2000 }.perform(&mut platform);
        assert_eq!(platform.calls, vec!["release", "jump 0x2000", "reset"]);
    }

    #[test]
    fn test_reset_handoff_only_resets() {
        let mut platform = RecordingPlatform::default();
        Handoff::Reset.perform(&mut platform);
        assert_eq!(platform.calls, vec!["reset"]);
    }
}
