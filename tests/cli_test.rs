use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn events_file(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

const PAYMENT: &str = r#"{"event":"payment","reference":"PAY-1","order":{"id":"order-1","customer":"customer-1","vendor":"vendor-1","delivery_fee":1075,"delivery_agent":"rider-1","lines":[{"store_price":9000,"listed_price":9675,"quantity":1}]}}"#;
const LINK_BANK: &str = r#"{"event":"link_bank","user":"vendor-1","account_name":"Ada Obi","account_number":"0123456789","bank_code":"058"}"#;

#[test]
fn test_replay_settles_and_reports_balances() {
    let events = events_file(&[
        LINK_BANK,
        PAYMENT,
        r#"{"event":"withdrawal_request","user":"vendor-1","amount":5000}"#,
        r#"{"event":"withdrawal_approve","user":"vendor-1","approver":"treasury"}"#,
        r#"{"event":"refund","order":"order-1","amount":1075,"reference":"RFD-1"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("oja-ledger"));
    cmd.arg(events.path());

    let output = cmd.output().expect("Failed to execute command");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    // vendor: 9,000 earned, 5,100 withdrawn (5,000 + 100 fee), 900 clawed back
    assert!(stdout.contains("vendor-1,3000,NGN,active,9000,5100"));
    // rider: 1,075 earned, 107.50 clawed back on the 10% refund
    assert!(stdout.contains("rider-1,967.5,NGN,active,1075,0"));
}

#[test]
fn test_replay_continues_past_failed_events() {
    let events = events_file(&[
        // refund before any payment exists: rejected, replay continues
        r#"{"event":"refund","order":"order-1","amount":1000,"reference":"RFD-0"}"#,
        PAYMENT,
    ]);

    let mut cmd = Command::new(cargo_bin!("oja-ledger"));
    cmd.arg(events.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("vendor-1,9000,NGN,active,9000,0"))
        .stderr(predicate::str::contains("Error processing event"));
}

#[test]
fn test_withdrawal_without_bank_account_is_rejected() {
    let events = events_file(&[
        PAYMENT,
        r#"{"event":"withdrawal_request","user":"vendor-1","amount":5000}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("oja-ledger"));
    cmd.arg(events.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("vendor-1,9000,NGN,active,9000,0"))
        .stderr(predicate::str::contains("no verified bank account"));
}

#[test]
fn test_missing_events_file_fails() {
    let mut cmd = Command::new(cargo_bin!("oja-ledger"));
    cmd.arg("does-not-exist.jsonl");
    cmd.assert().failure();
}
