//! Channel state machine: directed transitions, their side effects and the
//! timer expiry handlers.
//!
//! | From              | To                | Trigger                                   |
//! |-------------------|-------------------|-------------------------------------------|
//! | BusSleep          | BusSleep          | NM PDU received                           |
//! | BusSleep          | RepeatMessage     | network request, passive start-up         |
//! | RepeatMessage     | ReadySleep        | repeat message timer, not requested       |
//! | RepeatMessage     | NormalOperation   | repeat message timer, requested           |
//! | NormalOperation   | RepeatMessage     | repeat message bit or request             |
//! | NormalOperation   | ReadySleep        | network release                           |
//! | ReadySleep        | NormalOperation   | network request                           |
//! | ReadySleep        | RepeatMessage     | repeat message bit or request             |
//! | ReadySleep        | PrepareBusSleep   | NM-Timeout                                |
//! | PrepareBusSleep   | RepeatMessage     | NM PDU received, network request          |
//! | PrepareBusSleep   | BusSleep          | wait bus sleep timer                      |
//!
//! A [`ChannelContext`] borrows everything one channel needs (runtime,
//! configuration, collaborators) for the duration of a single request.
use crate::config::{ChannelConfig, NmGlobalConfig};
use crate::core::{NetworkHandle, NmState};
use crate::infra::codec::cbv::{self, CbvBit};
use crate::protocol::managment::channel::ChannelRuntime;
use crate::protocol::managment::timer::TimerKind;
use crate::protocol::transport::traits::{nm_bus::NmBus, nm_upper_layer::NmUpperLayer};

/// Mutable view over one channel and its collaborators.
pub(crate) struct ChannelContext<'a, B: NmBus, U: NmUpperLayer> {
    pub(crate) channel: NetworkHandle,
    pub(crate) runtime: &'a mut ChannelRuntime,
    pub(crate) config: &'a ChannelConfig,
    pub(crate) global: &'a NmGlobalConfig,
    pub(crate) bus: &'a mut B,
    pub(crate) upper: &'a mut U,
}

impl<'a, B: NmBus, U: NmUpperLayer> ChannelContext<'a, B, U> {
    //==============================================================================HELPERS
    fn set_state(&mut self, next: NmState) {
        let previous = self.runtime.state;
        self.runtime.state = next;
        self.runtime.mode = next.mode();
        if previous != next {
            #[cfg(feature = "defmt")]
            defmt::debug!("NM channel {}: {} -> {}", self.channel, previous, next);
            self.notify_state_change(previous, next);
        }
    }

    fn notify_state_change(&mut self, previous: NmState, next: NmState) {
        if self.global.state_change_ind_enabled {
            self.upper
                .state_change_notification(self.channel, previous, next);
        }
    }

    pub(crate) fn start_timer(&mut self, kind: TimerKind, duration: embassy_time::Duration) {
        self.runtime.timers.get_mut(kind).start(duration);
    }

    pub(crate) fn stop_timer(&mut self, kind: TimerKind) {
        self.runtime.timers.get_mut(kind).stop();
    }

    /// Message cycle timer armed to fire on the next periodic tick.
    pub(crate) fn start_message_cycle_next_tick(&mut self) {
        let period = self.global.main_function_period;
        self.start_timer(TimerKind::MessageCycle, period);
    }

    pub(crate) fn set_cbv_bit(&mut self, bit: CbvBit) {
        cbv::set_bit(
            self.runtime.tx_pdu.as_mut_slice(),
            self.config.cbv_position(),
            bit,
        );
    }

    pub(crate) fn write_cbv_bit(&mut self, bit: CbvBit, value: bool) {
        cbv::write_bit(
            self.runtime.tx_pdu.as_mut_slice(),
            self.config.cbv_position(),
            bit,
            value,
        );
    }

    fn clear_cbv_bit(&mut self, bit: CbvBit) {
        cbv::clear_bit(
            self.runtime.tx_pdu.as_mut_slice(),
            self.config.cbv_position(),
            bit,
        );
    }

    fn clear_cbv_if_node_detection(&mut self) {
        if self.config.node_detection() {
            cbv::clear(self.runtime.tx_pdu.as_mut_slice(), self.config.cbv_position());
        }
    }

    fn tx_enable_unless_passive(&mut self) {
        if !self.global.passive_mode && !self.runtime.comm_disabled {
            self.runtime.tx_enabled = true;
        }
    }

    fn start_remote_sleep_timer_if_enabled(&mut self) {
        if self.runtime.remote_sleep_ind_enabled {
            let duration = self.config.remote_sleep_ind_time();
            self.start_timer(TimerKind::RemoteSleepInd, duration);
        }
    }

    pub(crate) fn cancel_remote_sleep(&mut self) {
        if self.runtime.remote_sleep_ind {
            self.runtime.remote_sleep_ind = false;
            self.upper.remote_sleep_cancellation(self.channel);
        }
    }

    /// Hand the prepared NM PDU to the bus. Skipped (and reported as sent) while transmission is disabled.
    pub(crate) fn transmit_nm_pdu(&mut self) -> Result<(), B::Error> {
        if !self.runtime.tx_enabled {
            return Ok(());
        }
        self.refresh_user_data();
        self.bus
            .transmit(self.config.tx_pdu_id(), self.runtime.tx_pdu.as_slice())
    }

    /// Let the user-data router write its bytes into the transmit PDU.
    pub(crate) fn refresh_user_data(&mut self) {
        if !self.global.com_user_data_support {
            return;
        }
        if let Some(pdu) = self.config.user_data_pdu_id() {
            let range = self.config.user_data_layout().range();
            if let Some(user_data) = self.runtime.tx_pdu.as_mut_slice().get_mut(range) {
                self.upper.user_data_trigger_transmit(pdu, user_data);
            }
        }
    }

    /// Start an immediate transmission burst: first PDU right away, the rest on the immediate cycle.
    pub(crate) fn start_immediate_transmissions(&mut self) {
        self.runtime.immediate_transmissions = self.config.immediate_nm_transmissions();
        self.on_message_cycle_expired();
    }

    /// Active wake-up after a local request: active-wakeup bit, then the optional fast burst.
    pub(crate) fn announce_wake_up(&mut self, immediate: bool) {
        if self.config.active_wakeup_bit() {
            self.set_cbv_bit(CbvBit::ActiveWakeup);
        }
        if immediate {
            self.start_immediate_transmissions();
        }
    }

    //==============================================================================RECEPTION
    /// Process a received NM PDU already stored in the history.
    pub(crate) fn on_nm_pdu_received(&mut self, data: &[u8]) {
        let cbv_position = self.config.cbv_position();
        let repeat_requested = self.config.node_detection()
            && cbv::is_set(data, cbv_position, CbvBit::RepeatMessageRequest);

        match self.runtime.state {
            NmState::BusSleep => self.bus_sleep_to_bus_sleep(),
            NmState::PrepareBusSleep => self.prepare_bus_sleep_to_repeat_message(),
            NmState::RepeatMessage | NmState::NormalOperation | NmState::ReadySleep => {
                self.network_mode_to_network_mode();
                if repeat_requested {
                    if self.config.repeat_msg_ind() {
                        self.upper.repeat_message_indication(self.channel);
                    }
                    match self.runtime.state {
                        NmState::ReadySleep => self.ready_sleep_to_repeat_message(),
                        NmState::NormalOperation => self.normal_operation_to_repeat_message(),
                        _ => {}
                    }
                }
                if matches!(
                    self.runtime.state,
                    NmState::NormalOperation | NmState::ReadySleep
                ) {
                    self.cancel_remote_sleep();
                    self.start_remote_sleep_timer_if_enabled();
                }
                if self.global.coordination_sync_support {
                    let ready = cbv::is_set(data, cbv_position, CbvBit::CoordinatorSleepReady);
                    self.track_coordinator_sleep_ready(ready);
                }
            }
            NmState::Uninit => {}
        }

        if self.runtime.state == NmState::NormalOperation
            && self.runtime.bus_load_reduction_active
            && !self.runtime.comm_disabled
        {
            self.start_timer(TimerKind::MessageCycle, self.config.msg_reduced_time());
        }
    }

    fn track_coordinator_sleep_ready(&mut self, ready: bool) {
        if ready && !self.runtime.coord_ready_to_sleep {
            self.runtime.coord_ready_to_sleep = true;
            self.upper.coord_ready_to_sleep_indication(self.channel);
        } else if !ready && self.runtime.coord_ready_to_sleep {
            self.runtime.coord_ready_to_sleep = false;
            self.upper.coord_ready_to_sleep_cancellation(self.channel);
        }
    }

    //==============================================================================TRANSITIONS
    /// Bus sleep → bus sleep: a NM PDU woke the bus up.
    pub(crate) fn bus_sleep_to_bus_sleep(&mut self) {
        self.upper.network_start_indication(self.channel);
        self.notify_state_change(NmState::BusSleep, NmState::BusSleep);
    }

    /// Bus sleep → repeat message.
    pub(crate) fn bus_sleep_to_repeat_message(&mut self) {
        self.enter_network_mode();
    }

    /// Prepare bus sleep → repeat message.
    pub(crate) fn prepare_bus_sleep_to_repeat_message(&mut self) {
        self.stop_timer(TimerKind::WaitBusSleep);
        self.enter_network_mode();
    }

    fn enter_network_mode(&mut self) {
        self.tx_enable_unless_passive();
        self.runtime.bus_load_reduction_active = false;
        self.start_timer(TimerKind::Timeout, self.config.timeout_time());
        self.start_timer(TimerKind::RepeatMessage, self.config.repeat_message_time());
        self.start_timer(TimerKind::MessageCycle, self.config.msg_cycle_offset());
        let previous = self.runtime.state;
        self.runtime.state = NmState::RepeatMessage;
        self.runtime.mode = NmState::RepeatMessage.mode();
        #[cfg(feature = "defmt")]
        defmt::info!("NM channel {}: network mode", self.channel);
        self.upper.network_mode(self.channel);
        self.notify_state_change(previous, NmState::RepeatMessage);
    }

    /// Repeat message → repeat message: only the NM-Timeout is refreshed.
    pub(crate) fn repeat_message_to_repeat_message(&mut self) {
        self.network_mode_to_network_mode();
    }

    /// Repeat message → ready sleep.
    pub(crate) fn repeat_message_to_ready_sleep(&mut self) {
        self.runtime.tx_enabled = false;
        self.clear_cbv_if_node_detection();
        self.set_state(NmState::ReadySleep);
    }

    /// Repeat message → normal operation.
    pub(crate) fn repeat_message_to_normal_operation(&mut self) {
        if self.config.bus_load_reduction() {
            self.runtime.bus_load_reduction_active = true;
        }
        self.clear_cbv_if_node_detection();
        self.start_remote_sleep_timer_if_enabled();
        self.set_state(NmState::NormalOperation);
    }

    /// Normal operation → repeat message.
    pub(crate) fn normal_operation_to_repeat_message(&mut self) {
        self.restart_repeat_message();
        self.set_state(NmState::RepeatMessage);
    }

    /// Normal operation → normal operation.
    pub(crate) fn normal_operation_to_normal_operation(&mut self) {
        self.network_mode_to_network_mode();
    }

    /// Normal operation → ready sleep.
    pub(crate) fn normal_operation_to_ready_sleep(&mut self) {
        self.runtime.tx_enabled = false;
        self.set_state(NmState::ReadySleep);
    }

    /// Ready sleep → normal operation.
    pub(crate) fn ready_sleep_to_normal_operation(&mut self) {
        self.tx_enable_unless_passive();
        if self.config.bus_load_reduction() {
            self.runtime.bus_load_reduction_active = true;
        }
        self.start_timer(TimerKind::MessageCycle, self.config.msg_cycle_offset());
        self.start_remote_sleep_timer_if_enabled();
        self.set_state(NmState::NormalOperation);
    }

    /// Ready sleep → repeat message.
    pub(crate) fn ready_sleep_to_repeat_message(&mut self) {
        self.tx_enable_unless_passive();
        self.restart_repeat_message();
        self.set_state(NmState::RepeatMessage);
    }

    fn restart_repeat_message(&mut self) {
        self.runtime.bus_load_reduction_active = false;
        self.start_timer(TimerKind::RepeatMessage, self.config.repeat_message_time());
        self.start_timer(TimerKind::MessageCycle, self.config.msg_cycle_offset());
        self.cancel_remote_sleep();
    }

    /// Ready sleep → prepare bus sleep.
    pub(crate) fn ready_sleep_to_prepare_bus_sleep(&mut self) {
        if self.config.active_wakeup_bit() {
            self.clear_cbv_bit(CbvBit::ActiveWakeup);
        }
        self.stop_timer(TimerKind::MessageCycle);
        self.stop_timer(TimerKind::RemoteSleepInd);
        self.runtime.bus_load_reduction_active = false;
        self.runtime.remote_sleep_ind = false;
        self.runtime.coord_ready_to_sleep = false;
        self.start_timer(TimerKind::WaitBusSleep, self.config.wait_bus_sleep_time());
        let previous = self.runtime.state;
        self.runtime.state = NmState::PrepareBusSleep;
        self.runtime.mode = NmState::PrepareBusSleep.mode();
        #[cfg(feature = "defmt")]
        defmt::info!("NM channel {}: prepare bus sleep", self.channel);
        self.upper.prepare_bus_sleep_mode(self.channel);
        self.notify_state_change(previous, NmState::PrepareBusSleep);
    }

    /// Prepare bus sleep → bus sleep.
    pub(crate) fn prepare_bus_sleep_to_bus_sleep(&mut self) {
        self.runtime.timers.reset_all();
        self.runtime.immediate_transmissions = 0;
        self.runtime.comm_disabled = false;
        self.runtime.state = NmState::BusSleep;
        self.runtime.mode = NmState::BusSleep.mode();
        #[cfg(feature = "defmt")]
        defmt::info!("NM channel {}: bus sleep", self.channel);
        self.upper.bus_sleep_mode(self.channel);
        self.notify_state_change(NmState::PrepareBusSleep, NmState::BusSleep);
    }

    /// Any network state: NM-Timeout refreshed.
    pub(crate) fn network_mode_to_network_mode(&mut self) {
        self.start_timer(TimerKind::Timeout, self.config.timeout_time());
    }

    //==============================================================================TIMER_EXPIRY
    /// Run the handler of an expired timer.
    pub(crate) fn on_timer_expired(&mut self, kind: TimerKind) {
        #[cfg(feature = "defmt")]
        defmt::trace!("NM channel {}: {} expired", self.channel, kind);
        match kind {
            TimerKind::Timeout => self.on_timeout_expired(),
            TimerKind::MessageCycle => self.on_message_cycle_expired(),
            TimerKind::RepeatMessage => self.on_repeat_message_expired(),
            TimerKind::WaitBusSleep => self.on_wait_bus_sleep_expired(),
            TimerKind::RemoteSleepInd => self.on_remote_sleep_expired(),
        }
    }

    fn on_timeout_expired(&mut self) {
        match self.runtime.state {
            NmState::RepeatMessage => {
                #[cfg(feature = "defmt")]
                defmt::warn!("NM channel {}: tx timeout in repeat message", self.channel);
                self.upper.tx_timeout_exception(self.channel);
                self.start_timer(TimerKind::Timeout, self.config.timeout_time());
            }
            NmState::NormalOperation => {
                #[cfg(feature = "defmt")]
                defmt::warn!("NM channel {}: tx timeout in normal operation", self.channel);
                self.upper.tx_timeout_exception(self.channel);
                self.normal_operation_to_normal_operation();
            }
            NmState::ReadySleep => self.ready_sleep_to_prepare_bus_sleep(),
            _ => {}
        }
    }

    pub(crate) fn on_message_cycle_expired(&mut self) {
        // Not re-armed while disabled: enabling communication waits for a stopped cycle.
        if self.runtime.comm_disabled
            || !matches!(
                self.runtime.state,
                NmState::RepeatMessage | NmState::NormalOperation
            )
        {
            return;
        }

        let failed = match self.transmit_nm_pdu() {
            Ok(()) => false,
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "NM channel {}: transmit failed: {}",
                    self.channel,
                    defmt::Debug2Format(&_err)
                );
                true
            }
        };

        if self.runtime.immediate_transmissions > 0 {
            if failed {
                if self.runtime.last_tx_failed {
                    self.runtime.immediate_transmissions = 0;
                    self.start_timer(TimerKind::MessageCycle, self.config.msg_cycle_time());
                } else {
                    self.start_message_cycle_next_tick();
                }
            } else {
                self.start_timer(TimerKind::MessageCycle, self.config.immediate_nm_cycle_time());
                self.runtime.immediate_transmissions -= 1;
            }
        } else {
            self.start_timer(TimerKind::MessageCycle, self.config.msg_cycle_time());
        }
        self.runtime.last_tx_failed = failed;
    }

    fn on_repeat_message_expired(&mut self) {
        if self.runtime.state == NmState::RepeatMessage {
            if self.runtime.requested {
                self.repeat_message_to_normal_operation();
            } else {
                self.repeat_message_to_ready_sleep();
            }
        }
    }

    fn on_wait_bus_sleep_expired(&mut self) {
        if self.runtime.state == NmState::PrepareBusSleep {
            self.prepare_bus_sleep_to_bus_sleep();
        }
    }

    fn on_remote_sleep_expired(&mut self) {
        if matches!(
            self.runtime.state,
            NmState::NormalOperation | NmState::ReadySleep
        ) && !self.runtime.remote_sleep_ind
        {
            #[cfg(feature = "defmt")]
            defmt::info!("NM channel {}: remote sleep indication", self.channel);
            self.runtime.remote_sleep_ind = true;
            self.upper.remote_sleep_indication(self.channel);
        }
    }
}
