//! Scenario tests driving a complete GsmModem against a scripted modem

use crate::codec::{SubmitOptions, encode_sms_submit_pdu};
use crate::datatypes::DeliveryStatus;
use crate::error::{CmeError, GsmError};
use crate::modem::{
    CallDirection, CallState, CallStatusDialect, GsmModem, ModemConfig, ModemEvent, StoredMessage,
};
use crate::testing::FakeModem;
use std::io;
use std::time::Duration;
use tokio::sync::broadcast;

const TEST2_PDU: &str = "06917228195339040B917228214365F700003130805120618005D4F29C2E03";
const REPORT_PDU: &str = "07917248014000F506B70AA18092020000317071518590803170715185418000";

fn modem_with(fake: &FakeModem, config: ModemConfig) -> GsmModem {
    GsmModem::from_port(
        fake.port(),
        config.with_command_timeout(Duration::from_millis(500)),
    )
}

async fn next_event(events: &mut broadcast::Receiver<ModemEvent>) -> ModemEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no event within deadline")
        .expect("event channel closed")
}

/// Scripts a modem that passes initialisation. `overrides` replace the
/// default reply for their command.
fn script_init(fake: &FakeModem, overrides: &[(&str, &str)]) {
    let defaults = [
        ("AT+CFUN?", "\r\n+CFUN: 1\r\n\r\nOK\r\n"),
        ("AT+CPIN?", "\r\n+CPIN: READY\r\n\r\nOK\r\n"),
        ("AT+CLAC", "\r\n+CLAC: +CGMI,^DTMF,^CVOICE\r\n\r\nOK\r\n"),
        ("AT+WIND?", "\r\nERROR\r\n"),
        (
            "AT+CPMS=?",
            "\r\n+CPMS: (\"SM\",\"ME\"),(\"SM\",\"ME\"),(\"SM\",\"SR\")\r\n\r\nOK\r\n",
        ),
    ];
    let overridden = |command: &str| overrides.iter().any(|(o, _)| *o == command);
    let replies = overrides
        .iter()
        .chain(defaults.iter().filter(|(command, _)| !overridden(command)));
    for (command, reply) in replies {
        fake.on(command, reply);
    }
}

#[cfg(test)]
mod initialisation {
    use super::*;

    #[tokio::test]
    async fn test_init_sequence() {
        let fake = FakeModem::new();
        script_init(&fake, &[]);
        let modem = modem_with(&fake, ModemConfig::default());

        modem.init().await.unwrap();
        assert_eq!(modem.call_dialect(), CallStatusDialect::Huawei);
        assert!(modem.caller_id_enabled());
        assert!(modem.extended_ring_enabled());
        assert_eq!(
            fake.written(),
            vec![
                "ATZ",
                "ATE0",
                "AT+CFUN?",
                "AT+CMEE=1",
                "AT+CPIN?",
                "AT+CLAC",
                "AT^CVOICE=0",
                "AT+WIND?",
                "AT+COPS=3,0",
                "AT+CMGF=0",
                "AT+CPMS=?",
                "AT+CPMS=\"SM\",\"SM\",\"SR\"",
                "AT+CNMI=2,1,0,2",
                "AT+CLIP=1",
                "AT+CRC=1",
                "AT+CVHU=0",
            ]
        );
    }

    #[tokio::test]
    async fn test_init_text_mode_with_pin_and_smsc() {
        let fake = FakeModem::new();
        script_init(
            &fake,
            &[
                ("AT+CFUN?", "\r\n+CFUN: 0\r\n\r\nOK\r\n"),
                ("AT+CPIN?", "\r\n+CPIN: SIM PIN\r\n\r\nOK\r\n"),
                ("AT+WIND?", "\r\n+WIND: 0\r\n\r\nOK\r\n"),
                ("AT+CLIP=1", "\r\nERROR\r\n"),
            ],
        );
        let config = ModemConfig::default()
            .with_sms_text_mode(true)
            .with_pin("1234")
            .with_smsc("+27829135930");
        let modem = modem_with(&fake, config);

        modem.init().await.unwrap();
        assert_eq!(modem.call_dialect(), CallStatusDialect::Wavecom);
        assert!(modem.sms_text_mode());

        let written = fake.written();
        for command in [
            "AT+CFUN=1",
            "AT+CPIN=\"1234\"",
            "AT+WIND=50",
            "AT+CMGF=1",
            "AT+CSMP=49,167,0,0",
            "AT+CSCA=\"+27829135930\"",
        ] {
            assert!(written.iter().any(|w| w == command), "missing {command}");
        }
        // No cellular result codes without caller identification
        assert!(!written.iter().any(|w| w == "AT+CRC=1"));
        assert!(!modem.caller_id_enabled());
        assert!(!modem.extended_ring_enabled());

        let mut events = modem.subscribe();
        fake.push_unsolicited("\r\nRING\r\n\r\n+CLIP: \"+27820001111\",145\r\n");
        let ModemEvent::IncomingCall(call) = next_event(&mut events).await else {
            panic!("expected an incoming call");
        };
        assert_eq!(call.number, None);
    }

    #[tokio::test]
    async fn test_init_sim_pin_required() {
        let fake = FakeModem::new();
        script_init(&fake, &[("AT+CPIN?", "\r\n+CPIN: SIM PIN\r\n\r\nOK\r\n")]);
        fake.on("AT+CPIN?", "\r\n+CPIN: SIM PUK\r\n\r\nOK\r\n");
        let modem = modem_with(&fake, ModemConfig::default());

        let error = modem.init().await.unwrap_err();
        assert!(error.is_cme(CmeError::SimPinRequired));

        let error = modem.init().await.unwrap_err();
        assert!(error.is_cme(CmeError::SimPukRequired));
    }

    #[tokio::test]
    async fn test_init_cpin_without_final_ok() {
        let fake = FakeModem::new();
        script_init(&fake, &[("AT+CPIN?", "\r\n+CPIN: READY\r\n")]);
        let modem = modem_with(&fake, ModemConfig::default());

        modem.init().await.unwrap();
        assert!(fake.written().iter().any(|w| w == "AT+CVHU=0"));
    }

    #[tokio::test]
    async fn test_configured_dialect_skips_probe() {
        let fake = FakeModem::new();
        script_init(&fake, &[]);
        let config = ModemConfig::default().with_call_dialect(CallStatusDialect::Generic);
        let modem = modem_with(&fake, config);

        modem.init().await.unwrap();
        assert_eq!(modem.call_dialect(), CallStatusDialect::Generic);
        let written = fake.written();
        assert!(!written.iter().any(|w| w == "AT+WIND?"));
        assert!(written.iter().any(|w| w == "AT+COLP=1"));
    }
}

#[cfg(test)]
mod calls {
    use super::*;

    #[tokio::test]
    async fn test_incoming_call_rings_then_answered() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();

        fake.push_unsolicited("\r\n+CRING: VOICE\r\n\r\n+CLIP: \"+27820001111\",145\r\n");
        let ModemEvent::IncomingCall(call) = next_event(&mut events).await else {
            panic!("expected an incoming call");
        };
        assert_eq!(call.ring_count, 1);
        assert_eq!(call.number.as_deref(), Some("+27820001111"));

        fake.push_unsolicited("\r\nRING\r\n\r\n+CLIP: \"+27820001111\",145\r\n");
        let ModemEvent::IncomingCall(again) = next_event(&mut events).await else {
            panic!("expected the same call ringing again");
        };
        assert_eq!(again.id, call.id);
        assert_eq!(again.ring_count, 2);

        let answered = modem.answer(call.id).await.unwrap();
        assert_eq!(answered.state, CallState::Answered);
        assert!(matches!(
            next_event(&mut events).await,
            ModemEvent::CallAnswered(_)
        ));
        assert!(matches!(
            modem.answer(call.id).await,
            Err(GsmError::InvalidState(_))
        ));

        modem.send_dtmf(call.id, "12").await.unwrap();
        modem.hangup(call.id).await.unwrap();
        let ModemEvent::CallEnded(ended) = next_event(&mut events).await else {
            panic!("expected the call to end");
        };
        assert_eq!(ended.state, CallState::Ended);
        assert!(modem.active_calls().is_empty());
        assert_eq!(fake.written(), vec!["ATA", "AT+VTS=1;+VTS=2", "ATH"]);
    }

    #[tokio::test]
    async fn test_ring_and_caller_id_in_separate_reads() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();

        fake.push_unsolicited("\r\nRING\r\n\r\n+CLIP: \"+27820001111\",145\r\n");
        let ModemEvent::IncomingCall(call) = next_event(&mut events).await else {
            panic!("expected an incoming call");
        };

        fake.push_unsolicited("\r\nRING\r\n");
        let ModemEvent::IncomingCall(again) = next_event(&mut events).await else {
            panic!("expected the same call ringing again");
        };
        assert_eq!(again.id, call.id);
        assert_eq!(again.ring_count, 2);

        fake.push_unsolicited("\r\n+CLIP: \"+27820001111\",145\r\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let active = modem.active_calls();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].ring_count, 2);
        assert_eq!(active[0].number.as_deref(), Some("+27820001111"));
    }

    #[tokio::test]
    async fn test_unanswered_call_ends_after_ring_timeout() {
        let fake = FakeModem::new();
        let config = ModemConfig::default().with_ring_timeout(Duration::from_millis(100));
        let modem = modem_with(&fake, config);
        let mut events = modem.subscribe();

        fake.push_unsolicited("\r\nRING\r\n");
        let ModemEvent::IncomingCall(call) = next_event(&mut events).await else {
            panic!("expected an incoming call");
        };
        let ModemEvent::CallEnded(ended) = next_event(&mut events).await else {
            panic!("expected the abandoned call to end");
        };
        assert_eq!(ended.id, call.id);
        assert!(modem.active_calls().is_empty());
        assert!(fake.written().is_empty());
    }

    #[tokio::test]
    async fn test_caller_id_after_ring() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();

        fake.push_unsolicited("\r\nRING\r\n");
        let ModemEvent::IncomingCall(call) = next_event(&mut events).await else {
            panic!("expected an incoming call");
        };
        assert_eq!(call.number, None);

        fake.push_unsolicited("\r\n+CLIP: \"0821234567\",129\r\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let call = modem.call(call.id).unwrap();
        assert_eq!(call.number.as_deref(), Some("0821234567"));
    }

    #[tokio::test]
    async fn test_huawei_dial_answer_and_remote_hangup() {
        let fake = FakeModem::new();
        fake.on("ATD0123456789;", "\r\nOK\r\n\r\n^ORIG:1,0\r\n");
        let config = ModemConfig::default().with_call_dialect(CallStatusDialect::Huawei);
        let modem = modem_with(&fake, config);
        let mut events = modem.subscribe();

        let call = modem.dial("0123456789").await.unwrap();
        assert_eq!(call.id, 1);
        assert_eq!(call.direction, CallDirection::Outgoing);
        assert_eq!(call.state, CallState::Ringing);

        // DTMF only once the remote party answers
        assert!(matches!(
            modem.send_dtmf(1, "5").await,
            Err(GsmError::InvalidState(_))
        ));

        fake.push_unsolicited("\r\n^CONN:1,0\r\n");
        let ModemEvent::CallAnswered(answered) = next_event(&mut events).await else {
            panic!("expected the call to be answered");
        };
        assert_eq!(answered.id, 1);

        fake.push_unsolicited("\r\n^CEND:1,0,104,16\r\n");
        let ModemEvent::CallEnded(ended) = next_event(&mut events).await else {
            panic!("expected the call to end");
        };
        assert_eq!(ended.id, 1);
        assert!(modem.call(1).is_none());
    }

    /// Dials, lets the remote party answer and hangs up locally
    async fn dial_answer_hangup(dialect: CallStatusDialect, atd_reply: &str, answer: &str) {
        let fake = FakeModem::new();
        fake.on("ATD0123456789;", atd_reply);
        let modem = modem_with(&fake, ModemConfig::default().with_call_dialect(dialect));
        let mut events = modem.subscribe();

        let call = modem.dial("0123456789").await.unwrap();
        assert_eq!(call.direction, CallDirection::Outgoing, "{dialect:?}");
        assert_eq!(call.state, CallState::Ringing, "{dialect:?}");
        assert_eq!(modem.call(call.id).map(|c| c.state), Some(CallState::Ringing));

        fake.push_unsolicited(answer);
        let ModemEvent::CallAnswered(answered) = next_event(&mut events).await else {
            panic!("expected the call to be answered ({dialect:?})");
        };
        assert_eq!(answered.id, call.id);
        assert_eq!(modem.call(call.id).map(|c| c.state), Some(CallState::Answered));

        modem.hangup(call.id).await.unwrap();
        let ModemEvent::CallEnded(ended) = next_event(&mut events).await else {
            panic!("expected the call to end ({dialect:?})");
        };
        assert_eq!(ended.id, call.id);
        assert!(modem.call(call.id).is_none());
        assert!(modem.active_calls().is_empty());
        assert_eq!(fake.written(), vec!["ATD0123456789;", "ATH"]);
    }

    #[tokio::test]
    async fn test_generic_dial_answer_and_hangup() {
        dial_answer_hangup(
            CallStatusDialect::Generic,
            "\r\nOK\r\n",
            "\r\n+COLP: \"0123456789\",129\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_huawei_dial_answer_and_hangup() {
        dial_answer_hangup(
            CallStatusDialect::Huawei,
            "\r\nOK\r\n\r\n^ORIG:1,0\r\n",
            "\r\n^CONN:1,0\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_wavecom_dial_answer_and_hangup() {
        dial_answer_hangup(
            CallStatusDialect::Wavecom,
            "\r\n+WIND: 5,1\r\n",
            "\r\nOK\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_dialled_call_reusing_ringing_call_id() {
        let fake = FakeModem::new();
        fake.on("ATD0123456789;", "\r\nOK\r\n\r\n^ORIG:1,0\r\n");
        let config = ModemConfig::default().with_call_dialect(CallStatusDialect::Huawei);
        let modem = modem_with(&fake, config);
        let mut events = modem.subscribe();

        fake.push_unsolicited("\r\nRING\r\n\r\n+CLIP: \"+27820001111\",145\r\n");
        let ModemEvent::IncomingCall(incoming) = next_event(&mut events).await else {
            panic!("expected an incoming call");
        };
        assert_eq!(incoming.id, 1);

        let call = modem.dial("0123456789").await.unwrap();
        assert_eq!(call.id, 1);
        let ModemEvent::CallEnded(ended) = next_event(&mut events).await else {
            panic!("expected the displaced call to end");
        };
        assert_eq!(ended.direction, CallDirection::Incoming);
        assert_eq!(ended.number.as_deref(), Some("+27820001111"));

        let active = modem.active_calls();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].direction, CallDirection::Outgoing);
    }

    #[tokio::test]
    async fn test_huawei_dial_notification_inside_response() {
        let fake = FakeModem::new();
        fake.on("ATD0123456789;", "\r\n^ORIG:2,0\r\n\r\nOK\r\n");
        let config = ModemConfig::default().with_call_dialect(CallStatusDialect::Huawei);
        let modem = modem_with(&fake, config);

        let call = modem.dial("0123456789").await.unwrap();
        assert_eq!(call.id, 2);
        assert_eq!(call.number.as_deref(), Some("0123456789"));
    }

    #[tokio::test]
    async fn test_wavecom_dial() {
        let fake = FakeModem::new();
        fake.on("ATD0123456789;", "\r\n+WIND: 5,1\r\n");
        let config = ModemConfig::default().with_call_dialect(CallStatusDialect::Wavecom);
        let modem = modem_with(&fake, config);
        let mut events = modem.subscribe();

        let call = modem.dial("0123456789").await.unwrap();
        assert_eq!(call.id, 1);

        // The delayed ATD response signals the connection
        fake.push_unsolicited("\r\nOK\r\n");
        let ModemEvent::CallAnswered(answered) = next_event(&mut events).await else {
            panic!("expected the call to be answered");
        };
        assert_eq!(answered.id, 1);
    }

    #[tokio::test]
    async fn test_dial_without_setup_notification_times_out() {
        let fake = FakeModem::new();
        let config = ModemConfig::default()
            .with_call_dialect(CallStatusDialect::Huawei)
            .with_dial_timeout(Duration::from_millis(100));
        let modem = modem_with(&fake, config);

        assert!(matches!(
            modem.dial("0123456789").await,
            Err(GsmError::Timeout { .. })
        ));
        assert!(modem.active_calls().is_empty());
    }

    #[tokio::test]
    async fn test_generic_dial_ended_by_no_carrier() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();

        let call = modem.dial("0123456789").await.unwrap();
        assert_eq!(call.state, CallState::Ringing);

        fake.push_unsolicited("\r\nNO CARRIER\r\n");
        let ModemEvent::CallEnded(ended) = next_event(&mut events).await else {
            panic!("expected the call to end");
        };
        assert_eq!(ended.id, call.id);
    }
}

#[cfg(test)]
mod sms {
    use super::*;

    #[tokio::test]
    async fn test_send_text_mode() {
        let fake = FakeModem::new();
        fake.on("AT+CMGS=\"+27820001111\"", "\r\n> ")
            .on("Hello", "\r\n+CMGS: 12\r\n\r\nOK\r\n");
        let modem = modem_with(&fake, ModemConfig::default().with_sms_text_mode(true));

        let sent = modem.send_sms("+27820001111", "Hello").await.unwrap();
        assert_eq!(sent.reference, Some(12));
        assert_eq!(sent.status(), DeliveryStatus::Enroute);
        assert_eq!(fake.written(), vec!["AT+CMGS=\"+27820001111\"", "Hello"]);
    }

    #[tokio::test]
    async fn test_send_pdu_mode() {
        let options = SubmitOptions::default()
            .with_reference(0)
            .with_local_ton(ModemConfig::default().local_ton());
        let pdus = encode_sms_submit_pdu("+27820001111", "Hello", &options).unwrap();
        let cmgs = format!("AT+CMGS={}", pdus[0].tpdu_length());

        let fake = FakeModem::new();
        fake.on(&cmgs, "\r\n> ")
            .on(&pdus[0].to_hex(), "\r\n+CMGS: 7\r\n\r\nOK\r\n");
        let modem = modem_with(&fake, ModemConfig::default());

        let sent = modem.send_sms("+27820001111", "Hello").await.unwrap();
        assert_eq!(sent.reference, Some(7));
        assert_eq!(fake.written(), vec![cmgs, pdus[0].to_hex()]);
    }

    #[tokio::test]
    async fn test_text_mode_falls_back_to_pdu_for_unicode() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default().with_sms_text_mode(true));

        modem.send_sms("+27820001111", "Привет").await.unwrap();
        let written = fake.written();
        assert_eq!(written.first().map(String::as_str), Some("AT+CMGF=0"));
        assert_eq!(written.last().map(String::as_str), Some("AT+CMGF=1"));
        assert!(written[1].starts_with("AT+CMGS="));
        assert!(modem.sms_text_mode());
    }

    #[tokio::test]
    async fn test_send_failure_aborts_entry() {
        let fake = FakeModem::new();
        fake.on("AT+CMGS=\"+27820001111\"", "\r\n> ")
            .on("Hello", "\r\n+CMS ERROR: 500\r\n");
        let modem = modem_with(&fake, ModemConfig::default().with_sms_text_mode(true));

        let error = modem.send_sms("+27820001111", "Hello").await.unwrap_err();
        assert_eq!(error.cms_code(), Some(500));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fake.written().last().map(String::as_str), Some("<ESC>"));
    }

    #[tokio::test]
    async fn test_send_with_status_report() {
        let fake = FakeModem::new();
        fake.on("AT+CMGS=\"0829200000\"", "\r\n> ").on(
            "Hello",
            "\r\n+CMGS: 183\r\n\r\nOK\r\n\r\n+CDS: 6,183,\"0829200000\",129,\"13/07/17,15:58:09+08\",\"13/07/17,15:58:14+08\",0\r\n",
        );
        let modem = modem_with(&fake, ModemConfig::default().with_sms_text_mode(true));
        let mut events = modem.subscribe();

        let sent = modem
            .send_sms_with_report("0829200000", "Hello", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(sent.reference, Some(183));
        assert_eq!(sent.status(), DeliveryStatus::Delivered);
        let report = sent.report.unwrap();
        assert_eq!(report.recipient, "0829200000");
        assert_eq!(report.tp_status, 0);

        let ModemEvent::StatusReport(event) = next_event(&mut events).await else {
            panic!("expected a status report event");
        };
        assert_eq!(event, report);
    }

    #[tokio::test]
    async fn test_status_report_timeout_keeps_message() {
        let fake = FakeModem::new();
        fake.on("AT+CMGS=\"0829200000\"", "\r\n> ")
            .on("Hello", "\r\n+CMGS: 9\r\n\r\nOK\r\n");
        let modem = modem_with(&fake, ModemConfig::default().with_sms_text_mode(true));

        let sent = modem
            .send_sms_with_report("0829200000", "Hello", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(sent.reference, Some(9));
        assert!(sent.report.is_none());
        assert_eq!(sent.status(), DeliveryStatus::Enroute);
    }

    #[tokio::test]
    async fn test_receive_pdu_mode_message() {
        let fake = FakeModem::new();
        fake.on(
            "AT+CMGR=3",
            &format!("\r\n+CMGR: 0,,24\r\n{TEST2_PDU}\r\n\r\nOK\r\n"),
        );
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();

        fake.push_unsolicited("\r\n+CMTI: \"SM\",3\r\n");
        let ModemEvent::SmsReceived(sms) = next_event(&mut events).await else {
            panic!("expected a received message");
        };
        assert_eq!(sms.number, "+27821234567");
        assert_eq!(sms.text, "Test2");
        assert_eq!(sms.smsc.as_deref(), Some("+2782913593"));
        assert_eq!(fake.written(), vec!["AT+CMGR=3", "AT+CMGD=3"]);
    }

    #[tokio::test]
    async fn test_receive_status_report_from_other_storage() {
        let fake = FakeModem::new();
        fake.on(
            "AT+CMGR=2",
            "\r\n+CMGR: \"REC UNREAD\",6,183,\"+27841004005\",145,\"13/04/01,12:00:00+08\",\"13/04/01,12:00:05+08\",0\r\n\r\nOK\r\n",
        );
        let modem = modem_with(&fake, ModemConfig::default().with_sms_text_mode(true));
        let mut events = modem.subscribe();

        fake.push_unsolicited("\r\n+CDSI: \"SR\",2\r\n");
        let ModemEvent::StatusReport(report) = next_event(&mut events).await else {
            panic!("expected a status report");
        };
        assert_eq!(report.reference, 183);
        assert_eq!(report.status, DeliveryStatus::Delivered);
        assert_eq!(
            fake.written(),
            vec![
                "AT+CPMS=\"SR\"",
                "AT+CMGR=2",
                "AT+CMGD=2",
                "AT+CPMS=\"SM\"",
            ]
        );
    }

    #[tokio::test]
    async fn test_direct_pdu_status_report() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();

        fake.push_unsolicited(&format!("\r\n+CDS: 25\r\n{REPORT_PDU}\r\n"));
        let ModemEvent::StatusReport(report) = next_event(&mut events).await else {
            panic!("expected a status report");
        };
        assert_eq!(report.reference, 183);
        assert_eq!(report.recipient, "0829200000");
    }

    #[tokio::test]
    async fn test_direct_status_report_split_across_reads() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();

        fake.push_unsolicited("\r\n+CDS: 25\r\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        fake.push_unsolicited(&format!("{REPORT_PDU}\r\n"));
        let ModemEvent::StatusReport(report) = next_event(&mut events).await else {
            panic!("expected a status report");
        };
        assert_eq!(report.reference, 183);
        assert_eq!(report.recipient, "0829200000");
    }

    #[tokio::test]
    async fn test_read_stored_message() {
        let fake = FakeModem::new();
        fake.on(
            "AT+CMGR=1",
            &format!("\r\n+CMGR: 1,,24\r\n{TEST2_PDU}\r\n\r\nOK\r\n"),
        )
        .on("AT+CSCA?", "\r\n+CSCA: \"+27829135930\",145\r\n\r\nOK\r\n");
        let modem = modem_with(&fake, ModemConfig::default());

        let StoredMessage::Received(sms) = modem.read_stored_sms(1).await.unwrap() else {
            panic!("expected a received message");
        };
        assert_eq!(sms.text, "Test2");
        assert_eq!(modem.smsc().await.unwrap().as_deref(), Some("+27829135930"));
    }
}

#[cfg(test)]
mod failures {
    use super::*;

    #[tokio::test]
    async fn test_port_failure_reported_once() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();

        fake.fail(io::ErrorKind::BrokenPipe);
        let ModemEvent::FatalError(error) = next_event(&mut events).await else {
            panic!("expected a fatal error");
        };
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
        assert!(!modem.is_connected());
        assert!(matches!(
            modem.write("AT").await,
            Err(GsmError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_notifications_after_modem_dropped() {
        let fake = FakeModem::new();
        let modem = modem_with(&fake, ModemConfig::default());
        let mut events = modem.subscribe();
        drop(modem);

        fake.push_unsolicited("\r\nRING\r\n");
        let received = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
        assert!(!matches!(received, Ok(Ok(_))));
    }
}
