use crate::gps_processor::Point;
use crate::utils::parse_time;
use anyhow::{Context, Result};
use kml::{Kml, KmlReader};
use std::{
    ffi::OsStr,
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};
use strum_macros::{Display, EnumIter, EnumString};

/// Input spec that stands for stdin.
pub const STDIN: &str = "-";

pub type PointSource = Box<dyn Iterator<Item = Result<Point>>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InputFormat {
    Csv,
    Gpx,
    Kml,
}

impl InputFormat {
    /// Whether this format claims the given input spec (a path or `-`).
    pub fn can_read(self, spec: &str) -> bool {
        let extension = Path::new(spec)
            .extension()
            .and_then(OsStr::to_str)
            .map(|x| x.to_lowercase());
        match self {
            InputFormat::Csv => {
                spec == STDIN || matches!(extension.as_deref(), Some("csv") | Some("txt"))
            }
            InputFormat::Gpx => extension.as_deref() == Some("gpx"),
            InputFormat::Kml => extension.as_deref() == Some("kml"),
        }
    }

    pub fn open(self, spec: &str) -> Result<PointSource> {
        let reader = open_input(spec)?;
        let source: PointSource = match self {
            InputFormat::Csv => read_csv(reader),
            InputFormat::Gpx => Box::new(
                load_gpx(reader)
                    .with_context(|| format!("failed to load gpx from {spec}"))?
                    .into_iter()
                    .map(Ok),
            ),
            InputFormat::Kml => Box::new(
                load_kml(reader)
                    .with_context(|| format!("failed to load kml from {spec}"))?
                    .into_iter()
                    .map(Ok),
            ),
        };
        Ok(source)
    }
}

fn open_input(spec: &str) -> Result<Box<dyn Read>> {
    if spec == STDIN {
        return Ok(Box::new(io::stdin()));
    }
    let file = File::open(spec).with_context(|| format!("failed to open {spec}"))?;
    Ok(Box::new(file))
}

/// Streams `latitude,longitude,timestamp` rows. The first row is allowed to
/// be a header; every other row has to parse.
pub fn read_csv(reader: impl Read + 'static) -> PointSource {
    let records = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_records();

    Box::new(records.enumerate().filter_map(|(index, record)| {
        let record = match record {
            Ok(record) => record,
            Err(e) => return Some(Err(anyhow::Error::new(e).context("failed to read csv"))),
        };
        let line = record
            .position()
            .map(|position| position.line())
            .unwrap_or(index as u64 + 1);
        match parse_csv_record(&record) {
            Ok(point) => Some(Ok(point)),
            Err(_) if index == 0 => {
                debug!("skipping csv header: {:?}", record);
                None
            }
            Err(e) => Some(Err(e.context(format!("invalid csv row at line {line}")))),
        }
    }))
}

fn parse_csv_record(record: &csv::StringRecord) -> Result<Point> {
    let field = |index: usize, name: &str| {
        record
            .get(index)
            .filter(|x| !x.is_empty())
            .ok_or_else(|| anyhow!("missing {name}"))
    };
    let latitude = field(0, "latitude")?;
    let longitude = field(1, "longitude")?;
    let timestamp = field(2, "timestamp")?;
    Ok(Point {
        latitude: parse_coordinate(latitude, "latitude")?,
        longitude: parse_coordinate(longitude, "longitude")?,
        timestamp: timestamp
            .parse()
            .with_context(|| format!("invalid timestamp: `{timestamp}`"))?,
    })
}

// `NaN` and `inf` parse as f64 but are not positions
fn parse_coordinate(value: &str, name: &str) -> Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("invalid {name}: `{value}`"))?;
    if !parsed.is_finite() {
        bail!("invalid {name}: `{value}`");
    }
    Ok(parsed)
}

/// Every track point of every track, in document order.
pub fn load_gpx(input: impl Read) -> Result<Vec<Point>> {
    let gpx_data = gpx::read(BufReader::new(input))?;
    gpx_data
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .enumerate()
        .map(|(index, point)| {
            let time = point
                .time
                .as_ref()
                .ok_or_else(|| anyhow!("track point #{} has no time", index + 1))?
                .format()?;
            let timestamp =
                parse_time(&time).ok_or_else(|| anyhow!("invalid time in gpx: `{time}`"))?;
            Ok(Point::new(point.point().y(), point.point().x(), timestamp))
        })
        .collect()
}

/// Reads `gx:Track` placemarks, the way GPS loggers put timed coordinates in
/// KML. Each track is a run of `when` elements followed by the same number of
/// `gx:coord` elements.
pub fn load_kml(input: impl Read) -> Result<Vec<Point>> {
    let kml_data = KmlReader::<_, f64>::from_reader(BufReader::new(input)).read()?;
    let tracks = flatten_kml(vec![kml_data])
        .into_iter()
        .filter_map(|k| match k {
            Kml::Placemark(p) => Some(p.children),
            _ => None,
        })
        .flat_map(|arr| arr.into_iter().filter(|e| local_name(&e.name) == "Track"));

    let mut points = Vec::new();
    for track in tracks {
        let mut whens = Vec::new();
        let mut coords = Vec::new();
        for e in track.children {
            match local_name(&e.name) {
                "when" => whens.push(e.content),
                "coord" => coords.push(e.content),
                _ => {}
            }
        }
        append_track(&whens, &coords, &mut points)?;
    }
    Ok(points)
}

fn append_track(
    whens: &[Option<String>],
    coords: &[Option<String>],
    points: &mut Vec<Point>,
) -> Result<()> {
    if whens.len() != coords.len() {
        warn!(
            "kml track has {} timestamps but {} coordinates",
            whens.len(),
            coords.len()
        );
    }
    for (when, coord) in whens.iter().zip(coords) {
        let coord = match coord {
            Some(coord) => coord,
            None => continue,
        };
        let index = points.len() + 1;
        let when = when
            .as_deref()
            .ok_or_else(|| anyhow!("kml coordinate #{index} has no time"))?;
        let mut splitted = coord.split_whitespace();
        let mut next_number = |name: &str| -> Result<f64> {
            let value = splitted
                .next()
                .ok_or_else(|| anyhow!("kml coordinate #{index} has no {name}"))?;
            value
                .parse()
                .with_context(|| format!("invalid {name} in kml: `{value}`"))
        };
        let longitude = next_number("longitude")?;
        let latitude = next_number("latitude")?;
        let timestamp =
            parse_time(when).ok_or_else(|| anyhow!("invalid time in kml: `{when}`"))?;
        points.push(Point::new(latitude, longitude, timestamp));
    }
    Ok(())
}

// `gx:coord` and `coord` are the same thing to us
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn flatten_kml(kml: Vec<Kml>) -> Vec<Kml> {
    kml.into_iter()
        .flat_map(|k| match k {
            Kml::KmlDocument(d) => flatten_kml(d.elements),
            Kml::Document { attrs: _, elements } => flatten_kml(elements),
            Kml::Folder { attrs: _, elements } => flatten_kml(elements),
            k => vec![k],
        })
        .collect()
}
