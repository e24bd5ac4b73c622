//! Exercises multiple OS threads hitting the same `Environment`
//! concurrently, serialized by its coarse mutex rather than by any
//! cooperation between callers.

use amberkv::{DatabaseConfig, EngineConfig, Environment, InsertFlags, KeyType};

#[test]
fn concurrent_inserts_from_many_threads_are_all_findable() {
    let env = Environment::create_in_memory(EngineConfig { page_size: 1024, ..EngineConfig::default() }).unwrap();
    let config = DatabaseConfig::new("concurrent", KeyType::Uint32);
    let db = env.create_database(config).unwrap();

    const THREADS: u32 = 8;
    const PER_THREAD: u32 = 500;

    crossbeam::thread::scope(|scope| {
        for t in 0..THREADS {
            let db = &db;
            scope.spawn(move |_| {
                for i in 0..PER_THREAD {
                    let key = t * PER_THREAD + i;
                    db.insert(&key.to_le_bytes(), &key.to_le_bytes(), InsertFlags::Unique).unwrap();
                }
            });
        }
    })
    .unwrap();

    for key in 0..(THREADS * PER_THREAD) {
        assert_eq!(db.find(&key.to_le_bytes()).unwrap(), key.to_le_bytes().to_vec());
    }
}

#[test]
fn concurrent_readers_see_a_consistent_tree_while_not_racing_a_writer() {
    let env = Environment::create_in_memory(EngineConfig { page_size: 1024, ..EngineConfig::default() }).unwrap();
    let config = DatabaseConfig::new("readers", KeyType::Uint32);
    let db = env.create_database(config).unwrap();
    for i in 0u32..2000 {
        db.insert(&i.to_le_bytes(), &i.to_le_bytes(), InsertFlags::Unique).unwrap();
    }

    crossbeam::thread::scope(|scope| {
        for _ in 0..4 {
            let db = &db;
            scope.spawn(move |_| {
                for i in 0..2000u32 {
                    assert_eq!(db.find(&i.to_le_bytes()).unwrap(), i.to_le_bytes().to_vec());
                }
            });
        }
        let db = &db;
        scope.spawn(move |_| {
            for i in 2000u32..2500 {
                db.insert(&i.to_le_bytes(), &i.to_le_bytes(), InsertFlags::Unique).unwrap();
            }
        });
    })
    .unwrap();

    for i in 0u32..2500 {
        assert_eq!(db.find(&i.to_le_bytes()).unwrap(), i.to_le_bytes().to_vec());
    }
}
