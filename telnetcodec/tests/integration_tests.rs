//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Client/server negotiation tests: two negotiators wired back to back.

use proptest::prelude::*;
use telmux_telnetcodec::{
    QState, TelnetCodec, TelnetEvent, TelnetFlags, TelnetOption, TelnetSide, TelnetSupport,
    TelnetVerb, consts,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn create_client_server_pair() -> (TelnetCodec, TelnetCodec) {
    let server = TelnetCodec::with_support(
        &[
            TelnetSupport::new(TelnetOption::Echo, true, false),
            TelnetSupport::new(TelnetOption::SuppressGoAhead, true, true),
            TelnetSupport::new(TelnetOption::TransmitBinary, true, true),
        ],
        TelnetFlags::default(),
    );
    let client = TelnetCodec::with_support(
        &[
            TelnetSupport::new(TelnetOption::Echo, false, true),
            TelnetSupport::new(TelnetOption::SuppressGoAhead, true, true),
            TelnetSupport::new(TelnetOption::TransmitBinary, true, true),
            TelnetSupport::new(TelnetOption::TTYPE, true, false),
        ],
        TelnetFlags::default().with_nvt_eol(true),
    );
    (client, server)
}

fn wire(events: &[TelnetEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            TelnetEvent::Send(bytes) => Some(bytes.to_vec()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn data(events: &[TelnetEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            TelnetEvent::Data(bytes) => Some(bytes.to_vec()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Deliver `bytes` to `to`, then keep bouncing replies until both sides go quiet.
fn converge(from: &mut TelnetCodec, to: &mut TelnetCodec, bytes: Vec<u8>) -> Vec<TelnetEvent> {
    let mut seen = Vec::new();
    let mut pending = bytes;
    let mut forward = true;
    for _ in 0..16 {
        if pending.is_empty() {
            break;
        }
        let receiver = if forward { &mut *to } else { &mut *from };
        let events = receiver.receive_events(&pending).unwrap();
        pending = wire(&events);
        seen.extend(events);
        forward = !forward;
    }
    seen
}

// ============================================================================
// Negotiation
// ============================================================================

#[test]
fn client_server_echo_negotiation() {
    let (mut client, mut server) = create_client_server_pair();
    let mut request = Vec::new();
    server.negotiate(TelnetVerb::Will, TelnetOption::Echo, &mut request);
    let seen = converge(&mut server, &mut client, wire(&request));

    assert!(seen.contains(&TelnetEvent::Will(TelnetOption::Echo)));
    assert!(seen.contains(&TelnetEvent::Do(TelnetOption::Echo)));
    assert!(server.local_enabled(TelnetOption::Echo));
    assert!(client.remote_enabled(TelnetOption::Echo));
}

#[test]
fn client_server_reject_unsupported_option() {
    let (mut client, mut server) = create_client_server_pair();
    let mut request = Vec::new();
    client.negotiate(TelnetVerb::Will, TelnetOption::NAWS, &mut request);
    let seen = converge(&mut client, &mut server, wire(&request));

    assert!(!seen.iter().any(|event| matches!(event, TelnetEvent::Will(_))));
    assert_eq!(client.qstate(TelnetOption::NAWS, TelnetSide::Local), QState::No);
    assert!(!server.remote_enabled(TelnetOption::NAWS));
}

#[test]
fn client_server_mutual_binary_negotiation() {
    let (mut client, mut server) = create_client_server_pair();
    let mut request = Vec::new();
    server.negotiate(TelnetVerb::Will, TelnetOption::TransmitBinary, &mut request);
    server.negotiate(TelnetVerb::Do, TelnetOption::TransmitBinary, &mut request);
    converge(&mut server, &mut client, wire(&request));

    assert!(server.transmit_binary());
    assert!(server.receive_binary());
    assert!(client.transmit_binary());
    assert!(client.receive_binary());
}

#[test]
fn client_server_state_consistency_after_disable() {
    let (mut client, mut server) = create_client_server_pair();
    let mut request = Vec::new();
    server.negotiate(TelnetVerb::Will, TelnetOption::SuppressGoAhead, &mut request);
    converge(&mut server, &mut client, wire(&request));
    assert!(client.remote_enabled(TelnetOption::SuppressGoAhead));

    let mut request = Vec::new();
    server.negotiate(TelnetVerb::Wont, TelnetOption::SuppressGoAhead, &mut request);
    assert_eq!(
        server.qstate(TelnetOption::SuppressGoAhead, TelnetSide::Local),
        QState::WantNo
    );
    converge(&mut server, &mut client, wire(&request));
    assert_eq!(
        server.qstate(TelnetOption::SuppressGoAhead, TelnetSide::Local),
        QState::No
    );
    assert!(!client.remote_enabled(TelnetOption::SuppressGoAhead));
}

#[test]
fn client_server_simultaneous_offers_do_not_loop() {
    let (mut client, mut server) = create_client_server_pair();
    let mut from_client = Vec::new();
    let mut from_server = Vec::new();
    client.negotiate(TelnetVerb::Will, TelnetOption::SuppressGoAhead, &mut from_client);
    server.negotiate(TelnetVerb::Do, TelnetOption::SuppressGoAhead, &mut from_server);

    let at_server = server.receive_events(&wire(&from_client)).unwrap();
    let at_client = client.receive_events(&wire(&from_server)).unwrap();
    assert!(wire(&at_server).is_empty());
    assert!(wire(&at_client).is_empty());
    assert!(client.local_enabled(TelnetOption::SuppressGoAhead));
    assert!(server.remote_enabled(TelnetOption::SuppressGoAhead));
}

#[test]
fn client_server_terminal_type_exchange() {
    let (mut client, mut server) = create_client_server_pair();
    let mut out = Vec::new();
    server.ttype_send(&mut out);
    let at_client = client.receive_events(&wire(&out)).unwrap();
    assert!(at_client.iter().any(|event| matches!(
        event,
        TelnetEvent::TerminalType { name: None, .. }
    )));

    let mut reply = Vec::new();
    client.ttype_is("VT100", &mut reply);
    let at_server = server.receive_events(&wire(&reply)).unwrap();
    assert!(at_server.iter().any(|event| matches!(
        event,
        TelnetEvent::TerminalType { name: Some(name), .. } if name == "VT100"
    )));
}

// ============================================================================
// Data
// ============================================================================

#[test]
fn client_server_text_round_trip() {
    let (mut client, mut server) = create_client_server_pair();
    let mut out = Vec::new();
    server.send_text(b"Login:\nPassword:\r\n", &mut out);
    let at_client = client.receive_events(&wire(&out)).unwrap();
    assert_eq!(data(&at_client), b"Login:\nPassword:\r\n".to_vec());
}

#[test]
fn rfc854_iac_escaping() {
    let (mut client, mut server) = create_client_server_pair();
    let mut out = Vec::new();
    server.send(&[0x00, 0xFF, 0xFF, 0x7F], &mut out);
    assert_eq!(wire(&out), vec![0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
    let at_client = client.receive_events(&wire(&out)).unwrap();
    assert_eq!(data(&at_client), vec![0x00, 0xFF, 0xFF, 0x7F]);
}

#[test]
fn client_server_data_with_interspersed_commands() {
    let (_, mut server) = create_client_server_pair();
    let input = [
        b'a',
        consts::IAC,
        consts::AYT,
        b'b',
        consts::IAC,
        consts::GA,
        b'c',
    ];
    let events = server.receive_events(&input).unwrap();
    assert_eq!(
        events,
        vec![
            TelnetEvent::data(b"a"),
            TelnetEvent::Command(consts::AYT),
            TelnetEvent::data(b"b"),
            TelnetEvent::Command(consts::GA),
            TelnetEvent::data(b"c"),
        ]
    );
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn escaped_data_survives_receive(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut sender = TelnetCodec::new();
        let mut receiver = TelnetCodec::new();
        let mut out = Vec::new();
        sender.send(&payload, &mut out);
        let events = receiver.receive_events(&wire(&out)).unwrap();
        prop_assert_eq!(data(&events), payload);
    }

    #[test]
    fn split_points_do_not_change_data(
        payload in proptest::collection::vec(any::<u8>(), 1..256),
        split in any::<prop::sample::Index>(),
    ) {
        let mut sender = TelnetCodec::new();
        let mut out = Vec::new();
        sender.send(&payload, &mut out);
        let bytes = wire(&out);
        let at = split.index(bytes.len());

        let mut receiver = TelnetCodec::new();
        let mut events = receiver.receive_events(&bytes[..at]).unwrap();
        events.extend(receiver.receive_events(&bytes[at..]).unwrap());
        prop_assert_eq!(data(&events), payload);
    }
}
