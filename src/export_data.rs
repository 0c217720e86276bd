use crate::gps_processor::Point;
use crate::utils::format_time;
use anyhow::{Context, Result};
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use strum_macros::{Display, EnumIter, EnumString};
use time::OffsetDateTime;

/// Receives the filtered route. `start` is called once before the first
/// `emit` and `finish` once after the last one.
pub trait Sink {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn emit(&mut self, point: &Point) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    Csv,
    Gpx,
    Json,
    Kml,
}

impl OutputFormat {
    pub fn create_sink(self, writer: Box<dyn Write>) -> Box<dyn Sink> {
        match self {
            OutputFormat::Csv => Box::new(CsvSink::new(writer)),
            OutputFormat::Gpx => Box::new(GpxSink::new(writer)),
            OutputFormat::Json => Box::new(JsonSink::new(writer)),
            OutputFormat::Kml => Box::new(KmlSink::new(writer)),
        }
    }
}

/// Opens `path` for writing, or stdout when there is no path.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

/// Runs a whole, already known, list of points through `sink`.
pub fn write_points(sink: &mut dyn Sink, points: &[Point]) -> Result<()> {
    sink.start()?;
    for point in points {
        sink.emit(point)?;
    }
    sink.finish()
}

pub struct CsvSink {
    writer: csv::Writer<Box<dyn Write>>,
}

impl CsvSink {
    pub fn new(writer: Box<dyn Write>) -> Self {
        CsvSink {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(writer),
        }
    }
}

impl Sink for CsvSink {
    fn emit(&mut self, point: &Point) -> Result<()> {
        // `Display` keeps the shortest representation that reads back to
        // the same value, so coordinates are not altered on the way through.
        self.writer.write_record([
            point.latitude.to_string(),
            point.longitude.to_string(),
            point.timestamp.to_string(),
        ])?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub struct JsonSink {
    writer: Box<dyn Write>,
    count: usize,
}

impl JsonSink {
    pub fn new(writer: Box<dyn Write>) -> Self {
        JsonSink { writer, count: 0 }
    }
}

impl Sink for JsonSink {
    fn start(&mut self) -> Result<()> {
        self.writer.write_all(b"[")?;
        Ok(())
    }

    fn emit(&mut self, point: &Point) -> Result<()> {
        if self.count > 0 {
            self.writer.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.writer, point)?;
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.write_all(b"]\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

const CREATOR: &str = "gps-route-filter";
const TRACK_NAME: &str = "Track 1";

fn xml_time(timestamp: i64) -> Result<String> {
    format_time(timestamp).ok_or_else(|| anyhow!("timestamp out of range: {timestamp}"))
}

/// GPX goes through the `gpx` crate, which writes whole documents, so points
/// are buffered and the file is written in one go by `finish`.
pub struct GpxSink {
    writer: Box<dyn Write>,
    points: Vec<Waypoint>,
}

impl GpxSink {
    pub fn new(writer: Box<dyn Write>) -> Self {
        GpxSink {
            writer,
            points: Vec::new(),
        }
    }
}

impl Sink for GpxSink {
    fn emit(&mut self, point: &Point) -> Result<()> {
        let mut waypoint = Waypoint::new(geo_types::Point::new(point.longitude, point.latitude));
        let time = OffsetDateTime::from_unix_timestamp(point.timestamp)
            .with_context(|| format!("timestamp out of range: {}", point.timestamp))?;
        waypoint.time = Some(time.into());
        self.points.push(waypoint);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let track = Track {
            name: Some(TRACK_NAME.to_string()),
            segments: vec![TrackSegment {
                points: std::mem::take(&mut self.points),
            }],
            ..Default::default()
        };
        let gpx = Gpx {
            version: GpxVersion::Gpx11,
            creator: Some(CREATOR.to_string()),
            tracks: vec![track],
            ..Default::default()
        };
        gpx::write(&gpx, &mut self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// KML keeps all timestamps of a `gx:Track` ahead of its coordinates, so
/// points are buffered and the document is written in one go by `finish`.
/// `gx:Track` has no typed counterpart in the `kml` crate, so the document
/// is put together with `quick_xml`.
pub struct KmlSink {
    writer: Writer<Box<dyn Write>>,
    points: Vec<Point>,
}

impl KmlSink {
    pub fn new(writer: Box<dyn Write>) -> Self {
        KmlSink {
            writer: Writer::new_with_indent(writer, b' ', 2),
            points: Vec::new(),
        }
    }
}

impl Sink for KmlSink {
    fn emit(&mut self, point: &Point) -> Result<()> {
        self.points.push(*point);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let whens = self
            .points
            .iter()
            .map(|point| xml_time(point.timestamp))
            .collect::<Result<Vec<_>>>()?;
        let points = std::mem::take(&mut self.points);

        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.writer
            .create_element("kml")
            .with_attributes([
                ("xmlns", "http://www.opengis.net/kml/2.2"),
                ("xmlns:gx", "http://www.google.com/kml/ext/2.2"),
            ])
            .write_inner_content(|w| {
                w.create_element("Document").write_inner_content(|w| {
                    w.create_element("Placemark").write_inner_content(|w| {
                        w.create_element("name")
                            .write_text_content(BytesText::new(TRACK_NAME))?;
                        w.create_element("gx:Track").write_inner_content(|w| {
                            for when in &whens {
                                w.create_element("when")
                                    .write_text_content(BytesText::new(when))?;
                            }
                            for point in &points {
                                let coord = format!("{} {} 0", point.longitude, point.latitude);
                                w.create_element("gx:coord")
                                    .write_text_content(BytesText::new(&coord))?;
                            }
                            Ok(())
                        })?;
                        Ok(())
                    })?;
                    Ok(())
                })?;
                Ok(())
            })?;
        let inner = self.writer.get_mut();
        inner.write_all(b"\n")?;
        inner.flush()?;
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub points: Vec<Point>,
    pub started: bool,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }
}

impl Sink for MemorySink {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn emit(&mut self, point: &Point) -> Result<()> {
        self.points.push(*point);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
