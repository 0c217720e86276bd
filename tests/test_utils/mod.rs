use gps_route_filter::gps_processor::Point;
use gps_route_filter::import_data;
use std::fs::File;

// A drive through west London, the 4th and 5th fixes are jumps.
pub fn reference_route() -> Vec<Point> {
    vec![
        Point::new(51.51138670225, -0.17560958862388, 1326379271),
        Point::new(51.511520245835, -0.17449378967286, 1326379365),
        Point::new(51.511306575914, -0.17294883728027, 1326379585),
        Point::new(51.528290206973, -0.18110275268554, 1326380144),
        Point::new(51.510371582676, -0.14917373657562, 1326380169),
        Point::new(51.527188959817, -0.13130907659162, 1326380272),
        Point::new(51.524659019479, -0.12767314910872, 1326380295),
    ]
}

/// `points` picked by 1-based position, handy to state expectations.
pub fn pick(points: &[Point], positions: &[usize]) -> Vec<Point> {
    positions.iter().map(|i| points[i - 1]).collect()
}

/// Heading north along a meridian, one fix every `step_sec` seconds.
pub fn straight_route(len: usize, step_sec: i64) -> Vec<Point> {
    (0..len)
        .map(|i| Point::new(51.5 + i as f64 * 0.001, -0.1, 1_000 + i as i64 * step_sec))
        .collect()
}

/// Three points where the middle one is an 11 km excursion and the
/// route comes back to (almost) where it started.
pub fn spike(step_sec: i64) -> Vec<Point> {
    vec![
        Point::new(51.5, -0.1, 1_000),
        Point::new(51.6, -0.1, 1_000 + step_sec),
        Point::new(51.5, -0.1005, 1_000 + 2 * step_sec),
    ]
}

pub fn load_csv_for_test(path: &str) -> Vec<Point> {
    import_data::read_csv(File::open(path).unwrap())
        .collect::<anyhow::Result<_>>()
        .unwrap()
}

pub fn timestamps(points: &[Point]) -> Vec<i64> {
    points.iter().map(|p| p.timestamp).collect()
}

#[track_caller]
pub fn assert_near(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() <= epsilon,
        "{actual} is not within {epsilon} of {expected}"
    );
}
