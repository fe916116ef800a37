use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reconcile_rs::{Interval, Record};
use time::{Date, Duration};

#[allow(dead_code)]
pub fn records(json: &str) -> Vec<Record> {
    serde_json::from_str(json).expect("record fixture")
}

#[allow(dead_code)]
pub fn interval(begin: &str, end: Option<&str>) -> Interval {
    Interval::parse(Some(begin), end).expect("interval fixture")
}

/// Finite and open-ended ranges scattered over 2023.
#[allow(dead_code)]
pub fn random_intervals(count: usize, seed: u64) -> Vec<Interval> {
    let mut rng = StdRng::seed_from_u64(seed);
    let origin = Date::from_ordinal_date(2023, 1).expect("valid origin");
    (0..count)
        .map(|_| {
            let begin = origin + Duration::days(rng.random_range(0..365));
            if rng.random_bool(0.1) {
                Interval::from_start(begin)
            } else {
                let end = begin + Duration::days(rng.random_range(0..30));
                Interval::new(Some(begin), Some(end)).expect("ordered bounds")
            }
        })
        .collect()
}
