//! Integration tests for feed import and export

use serde_json::json;
use wallet_ledger::import::{export_all, import_all, PARSE_FAILED};
use wallet_ledger::*;

fn key(name: &str) -> Key {
    Key::from_passphrase(name).unwrap()
}

fn relaxed() -> ImportOptions {
    ImportOptions { strict: false }
}

fn strict() -> ImportOptions {
    ImportOptions { strict: true }
}

#[test]
fn test_transaction_map_multisig_lands_in_unspent() {
    let keys: Vec<Key> = ["k1", "k2", "k3"].iter().map(|n| key(n)).collect();
    let hexes: Vec<String> = keys.iter().map(|k| hex::encode(k.public_key_bytes())).collect();
    let asm = format!("2 {} {} {} 3 OP_CHECKMULTISIG", hexes[0], hexes[1], hexes[2]);
    let mut ledger = Ledger::with_keys(MAINNET_ADDRESS_VERSION, keys[..2].to_vec());

    let feed = json!({
        "comment": "multisig deposit",
        "deposit": {
            "hash": "ab".repeat(32),
            "ver": 1,
            "lock_time": 0,
            "time": "2014-06-26 01:14:05",
            "in": [{ "prev_out": { "hash": "cd".repeat(32), "n": 1 }, "scriptSig": "" }],
            "out": [{ "value": "0.75", "scriptPubKey": asm }]
        }
    })
    .to_string();

    let status = import_all(&feed, &mut ledger, relaxed()).unwrap();
    assert_eq!(status, ImportStatus { accepted: 1, rejected: 0 });
    let hash = parse_display_hash(&"ab".repeat(32)).unwrap();
    assert_eq!(ledger.unspent(), &[OutPoint::new(hash, 0)]);

    let record = ledger.output_record(&OutPoint::new(hash, 0)).unwrap();
    assert_eq!(record.kind, ScriptDescriptor::Multisig);
    assert_eq!(record.m, 2);
    assert_eq!(record.n(), 3);
    assert_eq!(record.value, 75_000_000);
    assert_eq!(record.timestamp, Some(1_403_745_245));
}

#[test]
fn test_export_import_round_trip_keeps_hashes() {
    let owner = key("owner");
    let mine = owner.address(MAINNET_ADDRESS_VERSION);
    let dest = key("dest").address(MAINNET_ADDRESS_VERSION);
    let mut ledger = Ledger::with_keys(MAINNET_ADDRESS_VERSION, vec![owner.clone()]);

    let funding = Transaction::new(
        1,
        vec![TransactionInput {
            prevout: OutPoint::null(),
            script_sig: Script::new(vec![0x04, 0xff, 0xff]),
            sequence: SEQUENCE_FINAL,
        }],
        vec![TransactionOutput {
            value: 100_000,
            script_pubkey: Script::pay_to_address(&mine),
        }],
        0,
    )
    .with_timestamp(Some(1_400_000_000));
    ledger.insert(funding, false, false).unwrap();
    let spend = signing::create_send(&ledger, &[SendTo::address(30_000, dest)], &mine, 1_000, &[], None)
        .unwrap();
    ledger.insert(spend, false, false).unwrap();

    let exported = export_all(&ledger);
    assert_eq!(exported.accepted, 2);
    assert_eq!(exported.rejected, 0);

    for options in [relaxed(), strict()] {
        let mut copy = Ledger::with_keys(MAINNET_ADDRESS_VERSION, vec![owner.clone()]);
        let status = import_all(&exported.text, &mut copy, options).unwrap();
        assert_eq!(status.accepted, 2);
        for tx in ledger.transactions() {
            assert_eq!(copy.transaction(&tx.hash()), Some(tx));
        }
        assert_eq!(copy.unspent(), ledger.unspent());
        assert_eq!(copy.balance(), ledger.balance());
    }
}

#[test]
fn test_unspent_snapshot_groups_by_hash() {
    let owner = key("owner");
    let script = Script::pay_to_address(&owner.address(MAINNET_ADDRESS_VERSION)).to_hex();
    let internal = "0123456789abcdef".repeat(4);
    let feed = json!({
        "unspent_outputs": [
            { "tx_hash": internal, "tx_output_n": 1, "value": 5000, "script": script },
            { "tx_hash": internal, "tx_output_n": 3, "value": 7000, "script": script },
            { "tx_hash": "ee".repeat(32), "tx_output_n": 0, "value": 1, "script": script }
        ]
    })
    .to_string();

    let mut ledger = Ledger::with_keys(MAINNET_ADDRESS_VERSION, vec![owner]);
    let status = import_all(&feed, &mut ledger, relaxed()).unwrap();
    assert_eq!(status.accepted, 2);

    let hash = parse_internal_hash(&internal).unwrap();
    let tx = ledger.transaction(&hash).unwrap();
    assert_eq!(tx.outputs.len(), 4);
    assert_eq!(tx.outputs[2], TransactionOutput::placeholder());
    assert_eq!(
        ledger.unspent()[..2].to_vec(),
        vec![OutPoint::new(hash, 1), OutPoint::new(hash, 3)]
    );
    assert_eq!(ledger.balance().available, 12_001);
}

#[test]
fn test_address_feed_envelope() {
    let owner = key("owner");
    let script = Script::pay_to_address(&owner.address(MAINNET_ADDRESS_VERSION));
    let txid = "5a".repeat(32);
    let feed = json!({
        "status": "success",
        "data": {
            "tx": {
                "txid": txid,
                "time": 1_400_000_000,
                "vin": [{ "coinbase": "04ffff001d0104", "sequence": 4294967295u32 }],
                "vout": [
                    { "n": 0, "value": 0.5, "scriptPubKey": { "asm": script.to_asm(), "hex": script.to_hex() } },
                    { "n": 1, "value": 1e-8, "scriptPubKey": { "asm": "OP_RETURN 6869" } }
                ]
            }
        }
    })
    .to_string();

    let mut ledger = Ledger::with_keys(MAINNET_ADDRESS_VERSION, vec![owner]);
    let status = import_all(&feed, &mut ledger, relaxed()).unwrap();
    assert_eq!(status.accepted, 1);

    let hash = parse_display_hash(&txid).unwrap();
    let tx = ledger.transaction(&hash).unwrap();
    assert!(tx.is_coinbase());
    assert_eq!(tx.timestamp, Some(1_400_000_000));
    assert_eq!(tx.outputs[1].value, 1);
    assert_eq!(ledger.balance().available, 50_000_000);
    assert_eq!(ledger.partition(Partition::Exit), &[OutPoint::new(hash, 1)]);
}

#[test]
fn test_strict_mode_rejects_wrong_hash() {
    let dest = key("dest").address(MAINNET_ADDRESS_VERSION);
    let feed = json!({
        "t": {
            "hash": "99".repeat(32),
            "in": [{ "prev_out": { "hash": "11".repeat(32), "n": 0 }, "scriptSig": "" }],
            "out": [{ "value": "1.0", "Address": dest.to_string() }]
        }
    })
    .to_string();

    let mut ledger = Ledger::new(MAINNET_ADDRESS_VERSION);
    let status = import_all(&feed, &mut ledger, strict()).unwrap();
    assert_eq!(status, ImportStatus { accepted: 0, rejected: 1 });

    let status = import_all(&feed, &mut ledger, relaxed()).unwrap();
    assert_eq!(status, ImportStatus { accepted: 1, rejected: 0 });
}

#[test]
fn test_missing_hash_is_computed() {
    let dest = key("dest").address(MAINNET_ADDRESS_VERSION);
    let feed = json!({
        "t": {
            "in": [{ "prev_out": { "hash": "11".repeat(32), "n": 0 } }],
            "out": [{ "value": "1.0", "Address": dest.to_string() }]
        }
    })
    .to_string();
    let mut ledger = Ledger::new(MAINNET_ADDRESS_VERSION);
    import_all(&feed, &mut ledger, strict()).unwrap();
    let tx = ledger.transactions().next().unwrap();
    assert!(tx.has_canonical_hash());
}

#[test]
fn test_unparsable_feed_is_all_invalid() {
    let mut ledger = Ledger::new(MAINNET_ADDRESS_VERSION);
    let err = import_all("{\"broken\": ", &mut ledger, relaxed()).unwrap_err();
    assert_eq!(err, LedgerError::Import(PARSE_FAILED.to_string()));
}

#[test]
fn test_provider_error_message_is_reported() {
    let mut ledger = Ledger::new(MAINNET_ADDRESS_VERSION);
    let feed = json!({ "status": "error", "data": { "tx": null }, "message": "x" }).to_string();
    let err = import_all(&feed, &mut ledger, relaxed()).unwrap_err();
    assert!(matches!(err, LedgerError::Import(_)));
}

#[test]
fn test_empty_text_only_reprocesses() {
    let mut ledger = Ledger::new(MAINNET_ADDRESS_VERSION);
    let status = import_all("   ", &mut ledger, relaxed()).unwrap();
    assert_eq!(status, ImportStatus::default());
}

#[test]
fn test_outcomes_stream_one_record_at_a_time() {
    let dest = key("dest").address(MAINNET_ADDRESS_VERSION);
    let feed = json!({
        "good": { "hash": "21".repeat(32), "out": [{ "value": "1", "Address": dest.to_string() }] },
        "bad": { "hash": "22".repeat(32), "out": [{ "Address": dest.to_string() }] }
    })
    .to_string();

    let mut ledger = Ledger::new(MAINNET_ADDRESS_VERSION);
    let outcomes: Vec<ImportOutcome> = Importer::new(&feed, &mut ledger, relaxed())
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(
        outcomes[0],
        ImportOutcome::Accepted(parse_display_hash(&"21".repeat(32)).unwrap())
    );
    assert!(matches!(outcomes[1], ImportOutcome::Rejected(_)));
    assert_eq!(outcomes[2], ImportOutcome::Complete);
}

#[test]
fn test_double_spend_in_feed_is_fatal() {
    let dest = key("dest").address(MAINNET_ADDRESS_VERSION);
    let input = json!([{ "prev_out": { "hash": "31".repeat(32), "n": 0 } }]);
    let feed = json!({
        "a": { "hash": "41".repeat(32), "in": input, "out": [{ "value": "1", "Address": dest.to_string() }] },
        "b": { "hash": "42".repeat(32), "in": input, "out": [{ "value": "2", "Address": dest.to_string() }] }
    })
    .to_string();

    let mut ledger = Ledger::new(MAINNET_ADDRESS_VERSION);
    let err = import_all(&feed, &mut ledger, relaxed()).unwrap_err();
    assert!(matches!(err, LedgerError::DoubleSpend(_)));
}

#[test]
fn test_double_spend_in_feed_prunes_earlier_records() {
    let owner = key("owner");
    let mine = owner.address(MAINNET_ADDRESS_VERSION);
    let dest = key("dest").address(MAINNET_ADDRESS_VERSION);
    let spend_of_fund = json!([{ "prev_out": { "hash": "51".repeat(32), "n": 0 } }]);
    let feed = json!({
        "fund": {
            "hash": "51".repeat(32),
            "in": [{ "prev_out": { "hash": "61".repeat(32), "n": 0 } }],
            "out": [{ "value": "1", "Address": mine.to_string() }]
        },
        "spend": { "hash": "52".repeat(32), "in": spend_of_fund, "out": [{ "value": "0.6", "Address": dest.to_string() }] },
        "conflict": { "hash": "53".repeat(32), "in": spend_of_fund, "out": [{ "value": "0.9", "Address": dest.to_string() }] }
    })
    .to_string();

    let mut ledger = Ledger::with_keys(MAINNET_ADDRESS_VERSION, vec![owner]);
    let err = import_all(&feed, &mut ledger, relaxed()).unwrap_err();
    assert!(matches!(err, LedgerError::DoubleSpend(_)));

    let fund_out = OutPoint::new(parse_display_hash(&"51".repeat(32)).unwrap(), 0);
    assert!(ledger.consumer_of(&fund_out).is_some());
    assert!(ledger.is_output_pruned(&fund_out));
    assert!(ledger.unspent().iter().all(|op| ledger.consumer_of(op).is_none()));
    assert_eq!(ledger.balance().available, 0);
}
