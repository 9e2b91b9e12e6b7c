//! Public facade of the engine: one instance drives every configured channel.
//!
//! Each request validates the channel handle, the initialisation status, the
//! current state and the configuration switches before touching anything; a
//! refused request leaves the channel unchanged. [`CanNm::main_function`]
//! must be called every `main_function_period`.
//!
//! ```
//! use korri_cannm::config::{ChannelConfig, NmConfig, NmGlobalConfig};
//! use korri_cannm::core::{NmState, PduId};
//! use korri_cannm::protocol::managment::can_nm::CanNm;
//! use korri_cannm::protocol::transport::traits::nm_bus::NmBus;
//!
//! struct NullBus;
//! impl NmBus for NullBus {
//!     type Error = ();
//!     fn transmit(&mut self, _pdu: PduId, _data: &[u8]) -> Result<(), ()> {
//!         Ok(())
//!     }
//! }
//!
//! let channel = ChannelConfig::builder(PduId(1), PduId(2)).build().unwrap();
//! let config = NmConfig::new(NmGlobalConfig::default(), [channel]).unwrap();
//!
//! let mut nm = CanNm::new(&config, NullBus, ());
//! nm.init();
//! nm.network_request(0).unwrap();
//! assert_eq!(nm.get_state(0).unwrap().0, NmState::RepeatMessage);
//! ```
use crate::config::{ChannelConfig, NmConfig};
use crate::core::{NetworkHandle, NmMode, NmState, PduId};
use crate::error::{NmError, NmResult};
use crate::infra::codec::cbv::CbvBit;
use crate::protocol::managment::channel::ChannelRuntime;
use crate::protocol::managment::state_machine::ChannelContext;
use crate::protocol::managment::timer::TimerKind;
use crate::protocol::transport::traits::{nm_bus::NmBus, nm_upper_layer::NmUpperLayer};

/// CAN network management instance for `N` channels.
pub struct CanNm<'c, B: NmBus, U: NmUpperLayer, const N: usize> {
    config: &'c NmConfig<N>,
    bus: B,
    upper: U,
    channels: [ChannelRuntime; N],
    initialized: bool,
}

impl<'c, B: NmBus, U: NmUpperLayer, const N: usize> CanNm<'c, B, U, N> {
    /// Create an uninitialised instance. Call [`CanNm::init`] before any request.
    pub fn new(config: &'c NmConfig<N>, bus: B, upper: U) -> Self {
        Self {
            config,
            bus,
            upper,
            channels: core::array::from_fn(|_| ChannelRuntime::new()),
            initialized: false,
        }
    }

    //==============================================================================LIFECYCLE
    /// Put every channel in bus sleep with stopped timers and a fresh transmit PDU.
    pub fn init(&mut self) {
        let config = self.config;
        for (runtime, channel) in self.channels.iter_mut().zip(config.channels()) {
            runtime.init(channel, config.global());
        }
        self.initialized = true;
        #[cfg(feature = "defmt")]
        defmt::info!("NM initialised with {} channel(s)", N);
    }

    /// Back to the uninitialised state. Only allowed when every channel sleeps.
    pub fn deinit(&mut self) -> NmResult<(), B::Error> {
        if !self.initialized {
            return Err(NmError::Uninit);
        }
        if self
            .channels
            .iter()
            .any(|runtime| runtime.state != NmState::BusSleep)
        {
            return Err(NmError::NotAllChannelsAsleep);
        }
        for runtime in self.channels.iter_mut() {
            runtime.deinit();
        }
        self.initialized = false;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &'c NmConfig<N> {
        self.config
    }

    /// Runtime state of a channel, for inspection.
    pub fn channel(&self, channel: NetworkHandle) -> Option<&ChannelRuntime> {
        self.channels.get(channel)
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn upper(&self) -> &U {
        &self.upper
    }

    pub fn upper_mut(&mut self) -> &mut U {
        &mut self.upper
    }

    //==============================================================================STATE_REQUESTS
    /// Start the channel without requesting the network.
    pub fn passive_start_up(&mut self, channel: NetworkHandle) -> NmResult<(), B::Error> {
        let mut ctx = self.context(channel)?;
        match ctx.runtime.state {
            NmState::BusSleep => ctx.bus_sleep_to_repeat_message(),
            NmState::PrepareBusSleep => ctx.prepare_bus_sleep_to_repeat_message(),
            state => return Err(NmError::InvalidState { state }),
        }
        Ok(())
    }

    /// The local application needs the network.
    pub fn network_request(&mut self, channel: NetworkHandle) -> NmResult<(), B::Error> {
        let mut ctx = self.context(channel)?;
        ctx.runtime.requested = true;

        let immediate = ctx.config.immediate_nm_transmissions() > 0;
        let re_enter_repeat = ctx.config.pn_handle_multiple_network_requests() && immediate;

        match ctx.runtime.state {
            NmState::BusSleep => {
                ctx.bus_sleep_to_repeat_message();
                ctx.announce_wake_up(immediate);
            }
            NmState::PrepareBusSleep => {
                ctx.prepare_bus_sleep_to_repeat_message();
                let restart = immediate || ctx.global.immediate_restart_enabled;
                ctx.announce_wake_up(restart);
            }
            NmState::ReadySleep if re_enter_repeat => {
                ctx.ready_sleep_to_repeat_message();
                ctx.start_immediate_transmissions();
            }
            NmState::NormalOperation if re_enter_repeat => {
                ctx.normal_operation_to_repeat_message();
                ctx.start_immediate_transmissions();
            }
            NmState::RepeatMessage if re_enter_repeat => {
                ctx.repeat_message_to_repeat_message();
                ctx.start_immediate_transmissions();
            }
            NmState::ReadySleep => ctx.ready_sleep_to_normal_operation(),
            _ => {}
        }
        Ok(())
    }

    /// The local application does not need the network anymore.
    pub fn network_release(&mut self, channel: NetworkHandle) -> NmResult<(), B::Error> {
        let mut ctx = self.context(channel)?;
        ctx.runtime.requested = false;
        if ctx.runtime.state == NmState::NormalOperation {
            ctx.normal_operation_to_ready_sleep();
        }
        Ok(())
    }

    /// Force the channel back to repeat message and ask the other nodes to do the same.
    pub fn repeat_message_request(&mut self, channel: NetworkHandle) -> NmResult<(), B::Error> {
        let mut ctx = self.context(channel)?;
        if !ctx.config.cbv_position().is_present() || !ctx.config.node_detection() {
            return Err(NmError::Disabled {
                feature: "node detection",
            });
        }
        match ctx.runtime.state {
            NmState::ReadySleep => {
                ctx.set_cbv_bit(CbvBit::RepeatMessageRequest);
                ctx.ready_sleep_to_repeat_message();
            }
            NmState::NormalOperation => {
                ctx.set_cbv_bit(CbvBit::RepeatMessageRequest);
                ctx.normal_operation_to_repeat_message();
            }
            state => return Err(NmError::InvalidState { state }),
        }
        Ok(())
    }

    //==============================================================================COMMUNICATION_CONTROL
    /// Stop NM transmissions while staying in network mode.
    pub fn disable_communication(&mut self, channel: NetworkHandle) -> NmResult<(), B::Error> {
        let mut ctx = self.active_network_context(channel)?;
        ctx.runtime.tx_enabled = false;
        ctx.runtime.comm_disabled = true;
        if ctx.global.remote_sleep_ind_enabled {
            ctx.runtime.remote_sleep_ind_enabled = false;
            ctx.stop_timer(TimerKind::RemoteSleepInd);
        }
        ctx.stop_timer(TimerKind::MessageCycle);
        ctx.stop_timer(TimerKind::Timeout);
        #[cfg(feature = "defmt")]
        defmt::info!("NM channel {}: communication disabled", channel);
        Ok(())
    }

    /// Resume NM transmissions; the next PDU leaves on the next tick.
    pub fn enable_communication(&mut self, channel: NetworkHandle) -> NmResult<(), B::Error> {
        let mut ctx = self.active_network_context(channel)?;
        if ctx.runtime.timers.get(TimerKind::MessageCycle).is_running() {
            return Err(NmError::MessageCycleRunning);
        }
        ctx.runtime.tx_enabled = true;
        ctx.runtime.comm_disabled = false;
        if ctx.global.remote_sleep_ind_enabled {
            ctx.runtime.remote_sleep_ind_enabled = true;
            ctx.start_timer(TimerKind::RemoteSleepInd, ctx.config.remote_sleep_ind_time());
        }
        ctx.start_timer(TimerKind::Timeout, ctx.config.timeout_time());
        ctx.start_message_cycle_next_tick();
        #[cfg(feature = "defmt")]
        defmt::info!("NM channel {}: communication enabled", channel);
        Ok(())
    }

    /// Send the NM PDU now, outside of the message cycle.
    pub fn request_bus_synchronization(
        &mut self,
        channel: NetworkHandle,
    ) -> NmResult<(), B::Error> {
        let mut ctx = self.active_network_context(channel)?;
        if !ctx.runtime.tx_enabled {
            return Err(NmError::Disabled {
                feature: "transmission",
            });
        }
        ctx.transmit_nm_pdu().map_err(NmError::Bus)
    }

    //==============================================================================USER_DATA
    /// Write the user data of the next transmitted PDUs. Returns the number of bytes written.
    pub fn set_user_data(
        &mut self,
        channel: NetworkHandle,
        data: &[u8],
    ) -> NmResult<usize, B::Error> {
        let ctx = self.context(channel)?;
        if !ctx.global.user_data_enabled {
            return Err(NmError::Disabled {
                feature: "user data",
            });
        }
        if ctx.global.com_user_data_support {
            return Err(NmError::Disabled {
                feature: "user data owned by the router",
            });
        }
        let layout = ctx.config.user_data_layout();
        if data.len() > layout.len {
            return Err(NmError::BufferTooSmall {
                needed: data.len(),
                available: layout.len,
            });
        }
        let start = layout.offset;
        ctx.runtime.tx_pdu.as_mut_slice()[start..start + data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Copy the user data of the last received PDU into `out`. Returns the number of bytes copied.
    pub fn get_user_data(
        &self,
        channel: NetworkHandle,
        out: &mut [u8],
    ) -> NmResult<usize, B::Error> {
        let (config, runtime) = self.checked(channel)?;
        if !self.config.global().user_data_enabled {
            return Err(NmError::Disabled {
                feature: "user data",
            });
        }
        let pdu = runtime.rx_history.latest().ok_or(NmError::NoPduReceived)?;
        let received = pdu.as_slice();
        let range = config.user_data_layout().range();
        let end = range.end.min(received.len());
        let user_data = received.get(range.start..end).unwrap_or(&[]);
        copy_out(user_data, out)
    }

    /// Node identifier carried by the last received PDU.
    pub fn get_node_identifier(&self, channel: NetworkHandle) -> NmResult<u8, B::Error> {
        let (config, runtime) = self.checked(channel)?;
        let index = config.nid_position().index().ok_or(NmError::Disabled {
            feature: "node identifier",
        })?;
        let pdu = runtime.rx_history.latest().ok_or(NmError::NoPduReceived)?;
        pdu.as_slice()
            .get(index)
            .copied()
            .ok_or(NmError::NoPduReceived)
    }

    /// Node identifier configured for this node.
    pub fn get_local_node_identifier(&self, channel: NetworkHandle) -> NmResult<u8, B::Error> {
        let (config, _) = self.checked(channel)?;
        Ok(config.node_id())
    }

    /// Copy the whole last received PDU into `out`. Returns the PDU length.
    pub fn get_pdu_data(&self, channel: NetworkHandle, out: &mut [u8]) -> NmResult<usize, B::Error> {
        let (config, runtime) = self.checked(channel)?;
        if !(config.node_detection()
            || config.node_id_enabled()
            || self.config.global().user_data_enabled)
        {
            return Err(NmError::Disabled { feature: "PDU data" });
        }
        let pdu = runtime.rx_history.latest().ok_or(NmError::NoPduReceived)?;
        copy_out(pdu.as_slice(), out)
    }

    //==============================================================================STATUS
    /// Current `(state, mode)` of the channel.
    pub fn get_state(&self, channel: NetworkHandle) -> NmResult<(NmState, NmMode), B::Error> {
        let (_, runtime) = self.checked(channel)?;
        Ok((runtime.state, runtime.mode))
    }

    /// `true` once every other node has been silent for the remote sleep time.
    pub fn check_remote_sleep_indication(
        &self,
        channel: NetworkHandle,
    ) -> NmResult<bool, B::Error> {
        let (_, runtime) = self.checked(channel)?;
        if !self.config.global().remote_sleep_ind_enabled {
            return Err(NmError::Disabled {
                feature: "remote sleep indication",
            });
        }
        match runtime.state {
            NmState::NormalOperation | NmState::ReadySleep => Ok(runtime.remote_sleep_ind),
            state => Err(NmError::InvalidState { state }),
        }
    }

    /// Set or clear the coordinator sleep-ready bit and send it right away.
    pub fn set_sleep_ready_bit(
        &mut self,
        channel: NetworkHandle,
        ready: bool,
    ) -> NmResult<(), B::Error> {
        let mut ctx = self.context(channel)?;
        if !ctx.global.coordination_sync_support {
            return Err(NmError::Disabled {
                feature: "coordination sync",
            });
        }
        if !ctx.config.cbv_position().is_present() {
            return Err(NmError::Disabled {
                feature: "control bit vector",
            });
        }
        ctx.write_cbv_bit(CbvBit::CoordinatorSleepReady, ready);
        ctx.transmit_nm_pdu().map_err(NmError::Bus)
    }

    /// Partial networking confirmed available: PN filtering may start.
    pub fn confirm_pn_availability(&mut self, channel: NetworkHandle) -> NmResult<(), B::Error> {
        let ctx = self.context(channel)?;
        if !ctx.global.global_pn_support {
            return Err(NmError::Disabled {
                feature: "partial networking",
            });
        }
        ctx.runtime.pn_filter_enabled = true;
        Ok(())
    }

    //==============================================================================BUS_INTERFACE
    /// Outcome of a transmission previously handed to the bus.
    pub fn tx_confirmation(&mut self, pdu: PduId, success: bool) -> NmResult<(), B::Error> {
        let channel = self.channel_for_pdu(pdu, |c| c.tx_pdu_id() == pdu)?;
        let mut ctx = self.context(channel)?;
        if success && ctx.runtime.mode == NmMode::Network {
            ctx.network_mode_to_network_mode();
        }
        if ctx.global.com_user_data_support {
            if let Some(user_pdu) = ctx.config.user_data_pdu_id() {
                ctx.upper.user_data_tx_confirmation(user_pdu, success);
            }
        }
        Ok(())
    }

    /// A NM PDU was received on `pdu`.
    ///
    /// Bytes beyond the configured PDU length are dropped; shorter frames are kept as received.
    pub fn rx_indication(&mut self, pdu: PduId, data: &[u8]) -> NmResult<(), B::Error> {
        let channel = self.channel_for_pdu(pdu, |c| c.rx_pdu_id() == pdu)?;
        let mut ctx = self.context(channel)?;
        let data = &data[..data.len().min(ctx.config.pdu_length())];
        #[cfg(feature = "defmt")]
        defmt::trace!("NM channel {}: rx {=[u8]:02x}", channel, data);

        ctx.runtime.rx_history.push(data);
        ctx.on_nm_pdu_received(data);

        if ctx.global.pdu_rx_indication_enabled {
            ctx.upper.pdu_rx_indication(channel);
        }
        if ctx.global.com_user_data_support {
            if let Some(user_pdu) = ctx.config.user_data_pdu_id() {
                ctx.upper.user_data_rx_indication(user_pdu, data);
            }
        }
        Ok(())
    }

    /// Copy the prepared NM PDU into `out` for a trigger-transmit bus. Returns the PDU length.
    ///
    /// `out` is left untouched when too small.
    pub fn trigger_transmit(&mut self, pdu: PduId, out: &mut [u8]) -> NmResult<usize, B::Error> {
        let channel = self.channel_for_pdu(pdu, |c| c.tx_pdu_id() == pdu)?;
        let mut ctx = self.context(channel)?;
        let len = ctx.runtime.tx_pdu.len();
        if out.len() < len {
            return Err(NmError::BufferTooSmall {
                needed: len,
                available: out.len(),
            });
        }
        ctx.refresh_user_data();
        out[..len].copy_from_slice(ctx.runtime.tx_pdu.as_slice());
        Ok(len)
    }

    /// Spontaneous transmission requested by the user-data router on its PDU.
    pub fn transmit(&mut self, pdu: PduId, user_data: &[u8]) -> NmResult<(), B::Error> {
        let global = self.config.global();
        if !(global.com_user_data_support || global.global_pn_support) {
            return Err(NmError::Disabled {
                feature: "spontaneous transmission",
            });
        }
        let channel = self.channel_for_pdu(pdu, |c| c.user_data_pdu_id() == Some(pdu))?;
        let mut ctx = self.context(channel)?;
        match ctx.runtime.state {
            NmState::RepeatMessage | NmState::NormalOperation => {}
            state => return Err(NmError::InvalidState { state }),
        }
        let range = ctx.config.user_data_layout().range();
        if user_data.len() > range.len() {
            return Err(NmError::BufferTooSmall {
                needed: user_data.len(),
                available: range.len(),
            });
        }
        ctx.runtime.tx_pdu.as_mut_slice()[range.start..range.start + user_data.len()]
            .copy_from_slice(user_data);
        ctx.transmit_nm_pdu().map_err(NmError::Bus)
    }

    //==============================================================================PERIODIC
    /// Advance every timer by one period and run the expiry handlers.
    pub fn main_function(&mut self) {
        if !self.initialized {
            return;
        }
        let period = self.config.global().main_function_period;
        for channel in 0..N {
            let expired = self.channels[channel].timers.tick_all(period);
            if expired.is_empty() {
                continue;
            }
            if let Ok(mut ctx) = self.context(channel) {
                for kind in expired.iter() {
                    ctx.on_timer_expired(kind);
                }
            }
        }
    }

    /// Stored received PDUs of a channel, oldest first.
    pub fn rx_history(
        &self,
        channel: NetworkHandle,
    ) -> NmResult<impl Iterator<Item = &[u8]> + '_, B::Error> {
        let (_, runtime) = self.checked(channel)?;
        Ok(runtime.rx_history.iter().map(|pdu| pdu.as_slice()))
    }

    //==============================================================================INTERNALS
    fn context(
        &mut self,
        channel: NetworkHandle,
    ) -> NmResult<ChannelContext<'_, B, U>, B::Error> {
        if !self.initialized {
            return Err(NmError::Uninit);
        }
        let config = self.config;
        let channel_config = config
            .channel(channel)
            .ok_or(NmError::InvalidChannel { channel })?;
        let runtime = self
            .channels
            .get_mut(channel)
            .ok_or(NmError::InvalidChannel { channel })?;
        Ok(ChannelContext {
            channel,
            runtime,
            config: channel_config,
            global: config.global(),
            bus: &mut self.bus,
            upper: &mut self.upper,
        })
    }

    /// Context of a channel in network mode, refused in passive mode.
    fn active_network_context(
        &mut self,
        channel: NetworkHandle,
    ) -> NmResult<ChannelContext<'_, B, U>, B::Error> {
        let ctx = self.context(channel)?;
        if ctx.global.passive_mode {
            return Err(NmError::PassiveMode);
        }
        if ctx.runtime.mode != NmMode::Network {
            return Err(NmError::NotInNetworkMode);
        }
        Ok(ctx)
    }

    fn checked(
        &self,
        channel: NetworkHandle,
    ) -> NmResult<(&'c ChannelConfig, &ChannelRuntime), B::Error> {
        if !self.initialized {
            return Err(NmError::Uninit);
        }
        let config: &'c NmConfig<N> = self.config;
        let config = config
            .channel(channel)
            .ok_or(NmError::InvalidChannel { channel })?;
        let runtime = self
            .channels
            .get(channel)
            .ok_or(NmError::InvalidChannel { channel })?;
        Ok((config, runtime))
    }

    fn channel_for_pdu(
        &self,
        pdu: PduId,
        matches: impl Fn(&ChannelConfig) -> bool,
    ) -> NmResult<NetworkHandle, B::Error> {
        if !self.initialized {
            return Err(NmError::Uninit);
        }
        self.config
            .channels()
            .iter()
            .position(matches)
            .ok_or(NmError::UnknownPdu { pdu })
    }
}

fn copy_out<E: core::fmt::Debug>(source: &[u8], out: &mut [u8]) -> NmResult<usize, E> {
    if out.len() < source.len() {
        return Err(NmError::BufferTooSmall {
            needed: source.len(),
            available: out.len(),
        });
    }
    out[..source.len()].copy_from_slice(source);
    Ok(source.len())
}
