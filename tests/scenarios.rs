//! End-to-end scenarios exercising a whole `Environment` the way an
//! embedder would: create, insert, find, cursor-iterate, close, reopen.

use amberkv::{CursorFlags, DatabaseConfig, EngineConfig, Environment, Error, InsertFlags, KeyType};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn engine(page_size: u32) -> EngineConfig {
    EngineConfig { page_size, ..EngineConfig::default() }
}

/// S1 — POD<u32> round trip.
#[test]
fn pod_u32_round_trip() {
    let env = Environment::create_in_memory(engine(4096)).unwrap();
    let mut config = DatabaseConfig::new("ints", KeyType::Uint32);
    config.record_size = 4;
    let db = env.create_database(config).unwrap();

    for i in 0u32..10 {
        db.insert(&i.to_le_bytes(), &i.to_le_bytes(), InsertFlags::Unique).unwrap();
    }
    for i in 0u32..10 {
        assert_eq!(db.find(&i.to_le_bytes()).unwrap(), i.to_le_bytes().to_vec());
    }
    for i in 0u32..10 {
        db.erase(&i.to_le_bytes()).unwrap();
    }
    for i in 0u32..10 {
        assert!(matches!(db.find(&i.to_le_bytes()), Err(Error::KeyNotFound)));
    }
}

/// S2 — variable-length keys, one inline and one spilled to a blob
/// (page size 4096 resolves to a 128-byte extended-key threshold),
/// surviving a close/reopen round trip.
#[test]
fn variable_keys_with_extended_blob_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s2.akv");
    let mut rng = StdRng::seed_from_u64(2);
    let short_key: Vec<u8> = (0..64).map(|_| rng.gen()).collect();
    let long_key: Vec<u8> = (0..200).map(|_| rng.gen()).collect();

    {
        let env = Environment::create_file(&path, engine(4096)).unwrap();
        let config = DatabaseConfig::new("blobs", KeyType::Binary);
        let db = env.create_database(config).unwrap();
        db.insert(&short_key, b"hello", InsertFlags::Unique).unwrap();
        db.insert(&long_key, b"world", InsertFlags::Unique).unwrap();
        env.flush().unwrap();
        env.close().unwrap();
    }

    let env = Environment::open_file(&path, EngineConfig::default().cache_capacity_bytes).unwrap();
    let db = env.open_database("blobs").unwrap();
    assert_eq!(db.find(&short_key).unwrap(), b"hello");
    assert_eq!(db.find(&long_key).unwrap(), b"world");
}

/// S3 — duplicate overflow past the inline-run threshold, iterated both
/// directions with `OnlyDuplicates`.
#[test]
fn duplicate_overflow_iterates_in_both_directions() {
    let env = Environment::create_in_memory(engine(4096)).unwrap();
    let mut config = DatabaseConfig::new("dups", KeyType::Uint32);
    config.enable_duplicate_keys = true;
    let db = env.create_database(config).unwrap();

    let key = 42u32.to_le_bytes();
    for v in 0u32..300 {
        db.insert(&key, &v.to_le_bytes(), InsertFlags::Duplicate).unwrap();
    }

    let only_dups = CursorFlags { only_duplicates: true, ..Default::default() };
    let mut forward = Vec::new();
    let mut pos = db.cursor_first().unwrap();
    while let Some(p) = pos {
        let v = db.cursor_record(p).unwrap();
        forward.push(u32::from_le_bytes(v.try_into().unwrap()));
        pos = db.cursor_next(p, only_dups).unwrap();
    }
    assert_eq!(forward, (0..300).collect::<Vec<_>>());

    let mut backward = Vec::new();
    let mut pos = db.cursor_last().unwrap();
    while let Some(p) = pos {
        let v = db.cursor_record(p).unwrap();
        backward.push(u32::from_le_bytes(v.try_into().unwrap()));
        pos = db.cursor_prev(p, only_dups).unwrap();
    }
    assert_eq!(backward, (0..300).rev().collect::<Vec<_>>());
}

/// S4 — cursor leaf-boundary traversal over 10 000 sequential u64 keys:
/// 2048 steps forward from key 4096 lands on 6144, and the same number
/// of steps back lands where it started.
#[test]
fn cursor_leaf_boundary_traversal() {
    let env = Environment::create_in_memory(engine(1024)).unwrap();
    let config = DatabaseConfig::new("seq", KeyType::Uint64);
    let db = env.create_database(config).unwrap();

    for i in 0u64..10_000 {
        db.insert(&i.to_le_bytes(), &i.to_le_bytes(), InsertFlags::Unique).unwrap();
    }

    let mut pos = db.cursor_seek(&4096u64.to_le_bytes()).unwrap().expect("key 4096 must exist");
    for _ in 0..2048 {
        pos = db.cursor_next(pos, CursorFlags::default()).unwrap().expect("forward traversal should not run out");
    }
    let key = u64::from_le_bytes(db.cursor_key(pos).unwrap().try_into().unwrap());
    assert_eq!(key, 6144);

    for _ in 0..2048 {
        pos = db.cursor_prev(pos, CursorFlags::default()).unwrap().expect("backward traversal should not run out");
    }
    let key = u64::from_le_bytes(db.cursor_key(pos).unwrap().try_into().unwrap());
    assert_eq!(key, 4096);
}

/// S5 — split stress: 10 000 random-order distinct u32 keys on a small
/// (1024-byte) page size forces many splits; a full forward cursor
/// traversal must still visit every key exactly once, in order.
#[test]
fn split_stress_keeps_cursor_order_after_many_splits() {
    let env = Environment::create_in_memory(engine(1024)).unwrap();
    let config = DatabaseConfig::new("stress", KeyType::Uint32);
    let db = env.create_database(config).unwrap();

    let mut keys: Vec<u32> = (0..10_000).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(5));
    for &k in &keys {
        db.insert(&k.to_le_bytes(), &k.to_le_bytes(), InsertFlags::Unique).unwrap();
    }

    let mut seen = Vec::with_capacity(10_000);
    let mut pos = db.cursor_first().unwrap();
    while let Some(p) = pos {
        let k = u32::from_le_bytes(db.cursor_key(p).unwrap().try_into().unwrap());
        seen.push(k);
        pos = db.cursor_next(p, CursorFlags::default()).unwrap();
    }
    assert_eq!(seen.len(), 10_000);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    for k in 0u32..10_000 {
        assert_eq!(db.find(&k.to_le_bytes()).unwrap(), k.to_le_bytes().to_vec());
    }
}

/// S6 — crash-less reopen: insert, flush, close without a journal,
/// reopen with recovery disabled (the default), every key still found.
#[test]
fn crashless_reopen_preserves_all_inserted_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s6.akv");

    let mut engine_config = engine(4096);
    assert!(!engine_config.flags.enable_recovery);
    engine_config.flags.enable_recovery = false;

    {
        let env = Environment::create_file(&path, engine_config).unwrap();
        let config = DatabaseConfig::new("items", KeyType::Uint32);
        let db = env.create_database(config).unwrap();
        for i in 0u32..1000 {
            db.insert(&i.to_le_bytes(), &(i * 2).to_le_bytes(), InsertFlags::Unique).unwrap();
        }
        env.flush().unwrap();
        env.close().unwrap();
    }

    let env = Environment::open_file(&path, EngineConfig::default().cache_capacity_bytes).unwrap();
    let db = env.open_database("items").unwrap();
    for i in 0u32..1000 {
        assert_eq!(db.find(&i.to_le_bytes()).unwrap(), (i * 2).to_le_bytes().to_vec());
    }
}
