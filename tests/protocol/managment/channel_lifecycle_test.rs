//! Channel lifecycle tests: wake-up, network mode, coordinated sleep and de-initialisation.
mod helpers {
    include!("../../helpers/mod.rs");
}

use helpers::{channel_builder, config, global, Event, MockBus, MockUpper, RX_PDU, TX_PDU};
use korri_cannm::config::NmGlobalConfig;
use korri_cannm::core::{NmMode, NmState};
use korri_cannm::error::NmError;
use korri_cannm::protocol::managment::can_nm::CanNm;
use korri_cannm::protocol::managment::timer::TimerKind;

type Nm<'c> = CanNm<'c, MockBus, MockUpper, 1>;

/// One main function period. Every new transmission is confirmed like a real bus interface would.
fn tick(nm: &mut Nm<'_>, bus: &MockBus) {
    let before = bus.sent();
    nm.main_function();
    for _ in before..bus.sent() {
        nm.tx_confirmation(TX_PDU, true).unwrap();
    }
}

/// Tick until the channel reaches `state`. Returns the number of ticks used.
fn tick_until(nm: &mut Nm<'_>, bus: &MockBus, state: NmState, max_ticks: usize) -> usize {
    for count in 1..=max_ticks {
        tick(nm, bus);
        if nm.get_state(0).unwrap().0 == state {
            return count;
        }
    }
    panic!(
        "channel stuck in {:?} instead of {:?}",
        nm.get_state(0).unwrap().0,
        state
    );
}

fn state(nm: &Nm<'_>) -> NmState {
    nm.get_state(0).unwrap().0
}

#[test]
fn test_full_lifecycle() {
    // Request, release, then let the bus fall asleep once nobody transmits.
    let config = config(global(), channel_builder());
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    assert_eq!(nm.get_state(0).unwrap(), (NmState::BusSleep, NmMode::BusSleep));

    nm.network_request(0).unwrap();
    assert_eq!(
        nm.get_state(0).unwrap(),
        (NmState::RepeatMessage, NmMode::Network)
    );

    // Repeat message lasts 200 ms: NM PDUs leave at 10, 60, 110 and 160 ms.
    assert_eq!(tick_until(&mut nm, &bus, NmState::NormalOperation, 30), 20);
    assert_eq!(bus.sent(), 4);
    assert!(bus.frames().iter().all(|(pdu, _)| *pdu == TX_PDU));
    assert_eq!(upper.count(Event::TxTimeout(0)), 0);

    nm.network_release(0).unwrap();
    assert_eq!(state(&nm), NmState::ReadySleep);
    let sent = bus.sent();

    tick_until(&mut nm, &bus, NmState::PrepareBusSleep, 11);
    assert_eq!(nm.get_state(0).unwrap().1, NmMode::PrepareBusSleep);
    assert_eq!(tick_until(&mut nm, &bus, NmState::BusSleep, 40), 30);
    assert_eq!(bus.sent(), sent);

    assert_eq!(
        upper.transitions(),
        vec![
            (NmState::BusSleep, NmState::RepeatMessage),
            (NmState::RepeatMessage, NmState::NormalOperation),
            (NmState::NormalOperation, NmState::ReadySleep),
            (NmState::ReadySleep, NmState::PrepareBusSleep),
            (NmState::PrepareBusSleep, NmState::BusSleep),
        ]
    );
    assert_eq!(upper.count(Event::NetworkMode(0)), 1);
    assert_eq!(upper.count(Event::PrepareBusSleep(0)), 1);
    assert_eq!(upper.count(Event::BusSleep(0)), 1);
}

#[test]
fn test_bus_sleep_is_stable() {
    // Once asleep, nothing expires again and nothing is transmitted.
    let config = config(global(), channel_builder());
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    nm.passive_start_up(0).unwrap();
    tick_until(&mut nm, &bus, NmState::BusSleep, 100);

    let sent = bus.sent();
    for _ in 0..200 {
        tick(&mut nm, &bus);
    }
    assert_eq!(state(&nm), NmState::BusSleep);
    assert_eq!(bus.sent(), sent);
    assert_eq!(upper.count(Event::BusSleep(0)), 1);
    assert!(nm.channel(0).unwrap().all_timers_stopped());
}

#[test]
fn test_rx_in_bus_sleep_reports_network_start() {
    // A PDU on a sleeping bus is reported but does not wake the channel by itself.
    let config = config(global(), channel_builder());
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();

    nm.rx_indication(RX_PDU, &[0x05, 0x00, 0, 0, 0, 0, 0, 0])
        .unwrap();
    assert_eq!(state(&nm), NmState::BusSleep);
    assert_eq!(upper.count(Event::NetworkStart(0)), 1);
    assert_eq!(
        upper.transitions(),
        vec![(NmState::BusSleep, NmState::BusSleep)]
    );
    assert_eq!(bus.sent(), 0);
}

#[test]
fn test_rx_in_prepare_bus_sleep_restarts_network() {
    // Another node still talking pulls the channel back into network mode.
    let config = config(global(), channel_builder());
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    nm.passive_start_up(0).unwrap();
    tick_until(&mut nm, &bus, NmState::PrepareBusSleep, 50);

    nm.rx_indication(RX_PDU, &[0x05, 0x00, 0, 0, 0, 0, 0, 0])
        .unwrap();
    assert_eq!(state(&nm), NmState::RepeatMessage);
    let runtime = nm.channel(0).unwrap();
    assert!(!runtime.is_timer_running(TimerKind::WaitBusSleep));
    assert!(runtime.is_timer_running(TimerKind::RepeatMessage));
    assert_eq!(upper.count(Event::NetworkMode(0)), 2);
}

#[test]
fn test_remote_node_keeps_network_awake() {
    // Ready sleep is held as long as other nodes transmit; silence leads to sleep.
    let config = config(global(), channel_builder());
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    nm.passive_start_up(0).unwrap();
    tick_until(&mut nm, &bus, NmState::ReadySleep, 30);

    for round in 0..50 {
        tick(&mut nm, &bus);
        if round % 5 == 0 {
            nm.rx_indication(RX_PDU, &[0x05, 0x00, 0, 0, 0, 0, 0, 0])
                .unwrap();
        }
        assert_eq!(state(&nm), NmState::ReadySleep);
    }

    assert!(tick_until(&mut nm, &bus, NmState::PrepareBusSleep, 11) <= 10);
}

#[test]
fn test_repeat_message_bit_from_remote_node() {
    // A node detection request on the bus sends the channel back to repeat message.
    let config = config(global(), channel_builder().repeat_msg_ind(true));
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    nm.network_request(0).unwrap();
    tick_until(&mut nm, &bus, NmState::NormalOperation, 30);

    nm.rx_indication(RX_PDU, &[0x05, 0x01, 0, 0, 0, 0, 0, 0])
        .unwrap();
    assert_eq!(state(&nm), NmState::RepeatMessage);
    assert_eq!(upper.count(Event::RepeatMessageInd(0)), 1);
    assert_eq!(tick_until(&mut nm, &bus, NmState::NormalOperation, 30), 20);
}

#[test]
fn test_remote_sleep_indication() {
    // Silence in normal operation is reported once, the next PDU cancels it.
    let global = NmGlobalConfig {
        remote_sleep_ind_enabled: true,
        ..global()
    };
    let config = config(global, channel_builder());
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    nm.network_request(0).unwrap();
    tick_until(&mut nm, &bus, NmState::NormalOperation, 30);

    for _ in 0..15 {
        tick(&mut nm, &bus);
    }
    assert_eq!(upper.count(Event::RemoteSleepInd(0)), 1);
    assert!(nm.check_remote_sleep_indication(0).unwrap());

    for _ in 0..30 {
        tick(&mut nm, &bus);
    }
    assert_eq!(upper.count(Event::RemoteSleepInd(0)), 1);

    nm.rx_indication(RX_PDU, &[0x05, 0x00, 0, 0, 0, 0, 0, 0])
        .unwrap();
    assert_eq!(upper.count(Event::RemoteSleepCancel(0)), 1);
    assert!(!nm.check_remote_sleep_indication(0).unwrap());
}

#[test]
fn test_tx_timeout_reported() {
    // Without transmit confirmations the NM-Timeout reports the missing confirmation.
    let config = config(global(), channel_builder());
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    nm.network_request(0).unwrap();
    for _ in 0..10 {
        nm.main_function();
    }
    assert_eq!(upper.count(Event::TxTimeout(0)), 1);
    assert_eq!(state(&nm), NmState::RepeatMessage);
}

#[test]
fn test_deinit_rules() {
    // De-initialisation waits for bus sleep, then every request is refused.
    let config = config(global(), channel_builder());
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    nm.network_request(0).unwrap();
    assert!(matches!(nm.deinit(), Err(NmError::NotAllChannelsAsleep)));

    nm.network_release(0).unwrap();
    tick_until(&mut nm, &bus, NmState::BusSleep, 100);
    nm.deinit().unwrap();
    assert!(matches!(nm.network_request(0), Err(NmError::Uninit)));

    nm.init();
    assert_eq!(state(&nm), NmState::BusSleep);
}

#[test]
fn test_immediate_transmissions_on_wake_up() {
    // The burst leaves on the immediate cycle, then the regular cycle takes over.
    let config = config(global(), channel_builder().immediate_nm_transmissions(3));
    let bus = MockBus::new();
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, bus.clone(), upper.clone());
    nm.init();
    nm.network_request(0).unwrap();
    assert_eq!(bus.sent(), 1);

    // Burst frames at 0, 20 and 40 ms, then one more at 60 ms re-arming the regular cycle.
    for _ in 0..6 {
        tick(&mut nm, &bus);
    }
    assert_eq!(bus.sent(), 4);
    for _ in 0..4 {
        tick(&mut nm, &bus);
    }
    assert_eq!(bus.sent(), 4);
    tick(&mut nm, &bus);
    assert_eq!(bus.sent(), 5);
}
