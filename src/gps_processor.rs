use crate::export_data::Sink;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

pub const EARTH_RADIUS_KM: f64 = 6372.797;
pub const DEFAULT_TIGHT_ANGLE_DEG: f64 = 10.0;
pub const DEFAULT_SPEED_LIMIT_KMPH: f64 = 50.0;

const WINDOW_CAPACITY: usize = 3;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix time in seconds.
    pub timestamp: i64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Point {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Great-circle distance in kilometers.
    pub fn haversine_distance(&self, other: &Point) -> f64 {
        haversine(
            self.latitude.to_radians(),
            other.latitude.to_radians(),
            other.latitude - self.latitude,
            other.longitude - self.longitude,
        )
    }

    /// Same as `haversine_distance`, except the latitudes go into `cos`
    /// without being converted to radians. This is what older versions of
    /// the tool computed and we keep it so their output can be reproduced.
    pub fn legacy_haversine_distance(&self, other: &Point) -> f64 {
        haversine(
            self.latitude,
            other.latitude,
            other.latitude - self.latitude,
            other.longitude - self.longitude,
        )
    }

    pub fn same_location(&self, other: &Point) -> bool {
        self.haversine_distance(other) == 0.0
    }
}

fn haversine(lat1_cos_arg: f64, lat2_cos_arg: f64, delta_lat: f64, delta_lng: f64) -> f64 {
    let d_lat = delta_lat.to_radians();
    let d_lng = delta_lng.to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1_cos_arg.cos() * lat2_cos_arg.cos() * (d_lng / 2.0).sin().powi(2);
    // rounding (or the legacy cosine term) can push `a` slightly out of range
    let a = a.clamp(0.0, 1.0);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Interior angles of a triangle, in degrees. `alpha` sits at vertex A,
/// `beta` at B and `gamma` at C.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TriangleAngles {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

/// Solves a triangle from its sides with the law of cosines. `a`, `b` and
/// `c` are the sides opposite to A, B and C. Returns `None` unless all three
/// sides are finite and strictly positive.
pub fn solve_triangle(a: f64, b: f64, c: f64) -> Option<TriangleAngles> {
    if ![a, b, c].iter().all(|side| side.is_finite() && *side > 0.0) {
        return None;
    }
    let alpha = inverse_cosine((b * b + c * c - a * a) / (2.0 * b * c)).to_degrees();
    let beta = inverse_cosine((a * a + c * c - b * b) / (2.0 * a * c)).to_degrees();
    Some(TriangleAngles {
        alpha,
        beta,
        gamma: 180.0 - alpha - beta,
    })
}

// Noisy coordinates produce near-degenerate triangles whose cosine lands
// just outside [-1, 1].
fn inverse_cosine(cosine: f64) -> f64 {
    cosine.clamp(-1.0, 1.0).acos()
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FilterMode {
    /// Haversine in radians, speed over the whole A -> B -> C path.
    #[default]
    Standard,
    /// Matches the output of earlier releases: legacy haversine, speed
    /// over the B -> C leg only, and the angle at B compared in radians
    /// against the degree threshold.
    Legacy,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FilterConfig {
    pub tight_angle_deg: f64,
    pub speed_limit_kmph: f64,
    pub mode: FilterMode,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            tight_angle_deg: DEFAULT_TIGHT_ANGLE_DEG,
            speed_limit_kmph: DEFAULT_SPEED_LIMIT_KMPH,
            mode: FilterMode::Standard,
        }
    }
}

impl FilterConfig {
    pub fn legacy() -> Self {
        FilterConfig {
            mode: FilterMode::Legacy,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tight_angle_deg.is_finite() && self.tight_angle_deg > 0.0) {
            bail!(
                "tight angle must be a positive number of degrees, got {}",
                self.tight_angle_deg
            );
        }
        if self.speed_limit_kmph.is_nan() || self.speed_limit_kmph <= 0.0 {
            bail!(
                "speed limit must be a positive number of km/h, got {}",
                self.speed_limit_kmph
            );
        }
        Ok(())
    }

    fn distance(&self, from: &Point, to: &Point) -> f64 {
        match self.mode {
            FilterMode::Standard => from.haversine_distance(to),
            FilterMode::Legacy => from.legacy_haversine_distance(to),
        }
    }
}

/// Average speed in km/h between two unix timestamps. A zero or negative
/// elapsed time means the input is out of order; we treat that as infinitely
/// fast, and so is a time span too large for `i64`.
fn speed_kmph(distance_km: f64, from_sec: i64, to_sec: i64) -> f64 {
    match to_sec.checked_sub(from_sec) {
        Some(elapsed_sec) if elapsed_sec > 0 => distance_km / elapsed_sec as f64 * 3600.0,
        _ => f64::INFINITY,
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RejectReason {
    /// A and C are the same place but B is not.
    RoundTrip,
    TightTurn { angle_deg: f64, speed_kmph: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::RoundTrip => write!(f, "round trip with no net displacement"),
            RejectReason::TightTurn {
                angle_deg,
                speed_kmph,
            } => write!(
                f,
                "tight turn of {:.2} degrees at {:.1} km/h",
                angle_deg, speed_kmph
            ),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Decision {
    Accept,
    Reject(RejectReason),
}

/// Decides whether `b`, the middle point of a three point window, is bogus.
pub fn decide(a: &Point, b: &Point, c: &Point, config: &FilterConfig) -> Decision {
    let ab = config.distance(a, b);
    let bc = config.distance(b, c);
    let ac = config.distance(a, c);

    if ac == 0.0 && ab != 0.0 {
        return Decision::Reject(RejectReason::RoundTrip);
    }
    if !(ab > 0.0 && bc > 0.0 && ac > 0.0) {
        return Decision::Accept;
    }

    let speed = match config.mode {
        FilterMode::Standard => speed_kmph(ab + bc, a.timestamp, c.timestamp),
        FilterMode::Legacy => speed_kmph(bc, b.timestamp, c.timestamp),
    };
    let angles = match solve_triangle(bc, ac, ab) {
        Some(angles) => angles,
        None => return Decision::Accept,
    };
    let angle_at_b = match config.mode {
        FilterMode::Standard => angles.beta,
        FilterMode::Legacy => angles.beta.to_radians(),
    };

    if angle_at_b < config.tight_angle_deg && speed > config.speed_limit_kmph {
        Decision::Reject(RejectReason::TightTurn {
            angle_deg: angles.beta,
            speed_kmph: speed,
        })
    } else {
        Decision::Accept
    }
}

/// The (at most three) most recent points that are still waiting for a
/// decision, oldest first.
#[derive(Clone, Debug, Default)]
pub struct Window {
    points: [Point; WINDOW_CAPACITY],
    len: usize,
}

impl Window {
    pub fn new() -> Self {
        Window::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[Point] {
        &self.points[..self.len]
    }

    fn push_back(&mut self, point: Point) {
        // `RouteFilter::push` resolves a full window before the next point
        debug_assert!(self.len < WINDOW_CAPACITY, "window overflow");
        self.points[self.len] = point;
        self.len += 1;
    }

    fn pop_front(&mut self) -> Option<Point> {
        self.remove(0)
    }

    fn remove(&mut self, index: usize) -> Option<Point> {
        if index >= self.len {
            return None;
        }
        let point = self.points[index];
        self.points.copy_within(index + 1..self.len, index);
        self.len -= 1;
        Some(point)
    }

    fn drain(&mut self) -> Vec<Point> {
        let points = self.as_slice().to_vec();
        self.len = 0;
        points
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub points_read: usize,
    pub points_emitted: usize,
    pub round_trips_rejected: usize,
    pub tight_turns_rejected: usize,
}

impl FilterStats {
    pub fn rejected(&self) -> usize {
        self.round_trips_rejected + self.tight_turns_rejected
    }
}

pub struct RouteFilter {
    config: FilterConfig,
    window: Window,
    error_points: Vec<Point>,
    stats: FilterStats,
}

impl RouteFilter {
    pub fn new(config: FilterConfig) -> Self {
        RouteFilter {
            config,
            window: Window::new(),
            error_points: Vec::new(),
            stats: FilterStats::default(),
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Feeds the next point of the route. Returns the oldest point of the
    /// window once it has been confirmed.
    pub fn push(&mut self, point: Point) -> Option<Point> {
        self.stats.points_read += 1;
        self.window.push_back(point);

        let decision = match self.window.as_slice() {
            [a, b, c] => decide(a, b, c, &self.config),
            _ => return None,
        };

        match decision {
            Decision::Accept => {
                let confirmed = self.window.pop_front();
                if confirmed.is_some() {
                    self.stats.points_emitted += 1;
                }
                confirmed
            }
            Decision::Reject(reason) => {
                if let Some(rejected) = self.window.remove(1) {
                    debug!(
                        "dropping point ({}, {}) at {}: {}",
                        rejected.latitude, rejected.longitude, rejected.timestamp, reason
                    );
                    self.error_points.push(rejected);
                }
                match reason {
                    RejectReason::RoundTrip => self.stats.round_trips_rejected += 1,
                    RejectReason::TightTurn { .. } => self.stats.tight_turns_rejected += 1,
                }
                None
            }
        }
    }

    /// Ends the route. Whatever is left in the window never got enough
    /// successors to be judged, so it is returned as is.
    pub fn flush(&mut self) -> Vec<Point> {
        let trailing = self.window.drain();
        self.stats.points_emitted += trailing.len();
        trailing
    }

    pub fn error_points(&self) -> &[Point] {
        &self.error_points
    }

    pub fn take_error_points(&mut self) -> Vec<Point> {
        std::mem::take(&mut self.error_points)
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    /// Lazily filters `points`, flushing the window once they run out.
    pub fn process<I>(self, points: I) -> Filtered<I::IntoIter>
    where
        I: IntoIterator<Item = Point>,
    {
        Filtered {
            points: points.into_iter(),
            route_filter: self,
            trailing: None,
        }
    }
}

pub struct Filtered<I> {
    points: I,
    route_filter: RouteFilter,
    trailing: Option<std::vec::IntoIter<Point>>,
}

impl<I> Filtered<I> {
    pub fn route_filter(&self) -> &RouteFilter {
        &self.route_filter
    }

    pub fn into_route_filter(self) -> RouteFilter {
        self.route_filter
    }
}

impl<I: Iterator<Item = Point>> Iterator for Filtered<I> {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        loop {
            if let Some(trailing) = &mut self.trailing {
                return trailing.next();
            }
            match self.points.next() {
                Some(point) => {
                    if let Some(confirmed) = self.route_filter.push(point) {
                        return Some(confirmed);
                    }
                }
                None => self.trailing = Some(self.route_filter.flush().into_iter()),
            }
        }
    }
}

/// Pulls every point out of `source`, filters it and writes the survivors to
/// `sink`. A read error stops the run before `Sink::finish` is called.
pub fn run(
    source: impl Iterator<Item = Result<Point>>,
    sink: &mut dyn Sink,
    route_filter: &mut RouteFilter,
) -> Result<FilterStats> {
    sink.start()?;
    for point in source {
        if let Some(confirmed) = route_filter.push(point?) {
            sink.emit(&confirmed)?;
        }
    }
    for point in route_filter.flush() {
        sink.emit(&point)?;
    }
    sink.finish()?;
    Ok(route_filter.stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_shifts_on_pop_and_remove() {
        let mut window = Window::new();
        for i in 0..3 {
            window.push_back(Point::new(i as f64, 0.0, i));
        }
        assert_eq!(window.remove(1).unwrap().timestamp, 1);
        assert_eq!(
            window.as_slice().iter().map(|p| p.timestamp).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(window.pop_front().unwrap().timestamp, 0);
        assert_eq!(window.len(), 1);
        assert_eq!(window.drain().len(), 1);
        assert!(window.is_empty());
        assert!(window.pop_front().is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "window overflow")]
    fn window_never_holds_four_points() {
        let mut window = Window::new();
        for i in 0..4 {
            window.push_back(Point::new(0.0, 0.0, i));
        }
    }

    #[test]
    fn speed_with_non_increasing_time() {
        assert_eq!(speed_kmph(1.0, 100, 100), f64::INFINITY);
        assert_eq!(speed_kmph(1.0, 100, 70), f64::INFINITY);
        assert_eq!(speed_kmph(1.0, 0, 3600), 1.0);
    }

    #[test]
    fn speed_with_extreme_timestamps() {
        assert_eq!(speed_kmph(1.0, i64::MIN, i64::MAX), f64::INFINITY);
        assert_eq!(speed_kmph(1.0, i64::MAX, i64::MIN), f64::INFINITY);
        assert!(speed_kmph(1.0, 0, i64::MAX) < 1e-12);
    }

    #[test]
    fn validate_config() {
        assert!(FilterConfig::default().validate().is_ok());
        assert!(FilterConfig::legacy().validate().is_ok());
        let config = FilterConfig {
            tight_angle_deg: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = FilterConfig {
            speed_limit_kmph: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reason_display() {
        assert_eq!(
            RejectReason::TightTurn {
                angle_deg: 0.178,
                speed_kmph: 667.36,
            }
            .to_string(),
            "tight turn of 0.18 degrees at 667.4 km/h"
        );
    }
}
