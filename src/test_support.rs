use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use reconcile_rs::{Record, Value};

const FIRST_NAMES: [&str; 8] = ["Alice", "Bob", "Carol", "Dave", "Erin", "Frank", "Grace", "Heidi"];
const CITIES: [&str; 6] = ["Oslo", "Bergen", "Trondheim", "Stavanger", "Tromsø", "Bodø"];

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct GeneratedBatch {
    /// Records as persisted, each carrying an `id`
    pub stored: Vec<Record>,
    /// Edited copy of `stored` without ids, shuffled
    pub incoming: Vec<Record>,
    /// Number of incoming records that had a field edited
    pub edited: usize,
}

/// Deterministic person records with ids `1..=count`.
#[allow(dead_code)]
pub fn generate_records(count: u32, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=count)
        .map(|i| {
            let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
            let city = CITIES[rng.random_range(0..CITIES.len())];
            let mut record = Record::new();
            record.insert("id", i as i64);
            record.insert("name", format!("{} Person{:05}", first, i));
            record.insert("email", format!("{}.{:05}@example.com", first.to_lowercase(), i));
            record.insert("city", city);
            record.insert("visits", Value::List(vec![Value::Int(i as i64)]));
            record
        })
        .collect()
}

/// Stored records plus an incoming copy where `edit_probability` of the
/// records get one character appended to their email.
#[allow(dead_code)]
pub fn generate_batch(count: u32, edit_probability: f64, seed: u64) -> GeneratedBatch {
    let stored = generate_records(count, seed);
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut edited = 0;

    let mut incoming: Vec<Record> = stored
        .iter()
        .map(|record| {
            let mut copy = record.clone();
            copy.remove(&"id".into());
            if rng.random_bool(edit_probability) {
                if let Some(email) = copy.field("email").and_then(Value::as_str) {
                    let changed = format!("{}x", email);
                    copy.insert("email", changed);
                    edited += 1;
                }
            }
            copy
        })
        .collect();
    incoming.shuffle(&mut rng);

    GeneratedBatch {
        stored,
        incoming,
        edited,
    }
}
