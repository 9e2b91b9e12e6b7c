//! Notification sink above the engine (network management interface, state
//! manager, user-data router).
//!
//! Every method has an empty default body so an integrator only overrides the
//! notifications it cares about. `()` implements the trait for hosts that do
//! not listen at all.
use crate::core::{NetworkHandle, NmState, PduId};

#[allow(unused_variables)]
pub trait NmUpperLayer {
    /// A NM PDU was received while the channel sleeps.
    fn network_start_indication(&mut self, channel: NetworkHandle) {}
    /// The channel entered network mode.
    fn network_mode(&mut self, channel: NetworkHandle) {}
    /// The channel entered prepare bus sleep mode.
    fn prepare_bus_sleep_mode(&mut self, channel: NetworkHandle) {}
    /// The channel entered bus sleep mode.
    fn bus_sleep_mode(&mut self, channel: NetworkHandle) {}
    /// The channel state changed (only with state change notification enabled).
    fn state_change_notification(
        &mut self,
        channel: NetworkHandle,
        previous: NmState,
        current: NmState,
    ) {
    }
    /// No remote node requested the network for the remote sleep time.
    fn remote_sleep_indication(&mut self, channel: NetworkHandle) {}
    /// A remote node requests the network again after a remote sleep indication.
    fn remote_sleep_cancellation(&mut self, channel: NetworkHandle) {}
    /// A remote node asked for repeat message.
    fn repeat_message_indication(&mut self, channel: NetworkHandle) {}
    /// The coordinator announced it is ready to sleep.
    fn coord_ready_to_sleep_indication(&mut self, channel: NetworkHandle) {}
    /// The coordinator withdrew its ready-to-sleep announcement.
    fn coord_ready_to_sleep_cancellation(&mut self, channel: NetworkHandle) {}
    /// The NM-Timeout expired while the node was expected to transmit.
    fn tx_timeout_exception(&mut self, channel: NetworkHandle) {}
    /// A NM PDU was received (only with PDU receive indication enabled).
    fn pdu_rx_indication(&mut self, channel: NetworkHandle) {}

    // User-data router hooks, used when it owns the user data.

    /// Forward a received NM PDU to the router.
    fn user_data_rx_indication(&mut self, pdu: PduId, data: &[u8]) {}
    /// Outcome of a transmission requested through the router.
    fn user_data_tx_confirmation(&mut self, pdu: PduId, success: bool) {}
    /// Let the router refresh the user-data bytes right before they leave.
    fn user_data_trigger_transmit(&mut self, pdu: PduId, user_data: &mut [u8]) {}
}

impl NmUpperLayer for () {}

impl<T: NmUpperLayer + ?Sized> NmUpperLayer for &mut T {
    fn network_start_indication(&mut self, channel: NetworkHandle) {
        (**self).network_start_indication(channel)
    }
    fn network_mode(&mut self, channel: NetworkHandle) {
        (**self).network_mode(channel)
    }
    fn prepare_bus_sleep_mode(&mut self, channel: NetworkHandle) {
        (**self).prepare_bus_sleep_mode(channel)
    }
    fn bus_sleep_mode(&mut self, channel: NetworkHandle) {
        (**self).bus_sleep_mode(channel)
    }
    fn state_change_notification(
        &mut self,
        channel: NetworkHandle,
        previous: NmState,
        current: NmState,
    ) {
        (**self).state_change_notification(channel, previous, current)
    }
    fn remote_sleep_indication(&mut self, channel: NetworkHandle) {
        (**self).remote_sleep_indication(channel)
    }
    fn remote_sleep_cancellation(&mut self, channel: NetworkHandle) {
        (**self).remote_sleep_cancellation(channel)
    }
    fn repeat_message_indication(&mut self, channel: NetworkHandle) {
        (**self).repeat_message_indication(channel)
    }
    fn coord_ready_to_sleep_indication(&mut self, channel: NetworkHandle) {
        (**self).coord_ready_to_sleep_indication(channel)
    }
    fn coord_ready_to_sleep_cancellation(&mut self, channel: NetworkHandle) {
        (**self).coord_ready_to_sleep_cancellation(channel)
    }
    fn tx_timeout_exception(&mut self, channel: NetworkHandle) {
        (**self).tx_timeout_exception(channel)
    }
    fn pdu_rx_indication(&mut self, channel: NetworkHandle) {
        (**self).pdu_rx_indication(channel)
    }
    fn user_data_rx_indication(&mut self, pdu: PduId, data: &[u8]) {
        (**self).user_data_rx_indication(pdu, data)
    }
    fn user_data_tx_confirmation(&mut self, pdu: PduId, success: bool) {
        (**self).user_data_tx_confirmation(pdu, success)
    }
    fn user_data_trigger_transmit(&mut self, pdu: PduId, user_data: &mut [u8]) {
        (**self).user_data_trigger_transmit(pdu, user_data)
    }
}
