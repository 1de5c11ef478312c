use crate::classification::Label;
use crate::features::{AxisRange, FeatureMap, FeatureVector};
use crate::prelude::{FusionResult, Timestamp};
use crate::targets::Provenance;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

/// On-disk row of the classifier history table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryRow {
    source: Provenance,
    date: String,
    size: f64,
    speed: f64,
    deltav: f64,
    target_strength: f64,
    time_of_day: f64,
    current: f64,
    classification: Label,
}

/// Labelled feature vectors the classifier is fitted from.
///
/// The columns are index aligned and only ever grow. Features are held in
/// scaled `[0, 1]` form; `bounds` converts on the way in and out.
#[derive(Debug, Clone)]
pub struct ClassifierHistory {
    bounds: FeatureMap<AxisRange>,
    features: Vec<FeatureVector>,
    labels: Vec<Label>,
    sources: Vec<Provenance>,
    dates: Vec<String>,
}

impl ClassifierHistory {
    pub fn new(bounds: FeatureMap<AxisRange>) -> Self {
        Self {
            bounds,
            features: Vec::new(),
            labels: Vec::new(),
            sources: Vec::new(),
            dates: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn bounds(&self) -> &FeatureMap<AxisRange> {
        &self.bounds
    }

    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn sources(&self) -> &[Provenance] {
        &self.sources
    }

    /// Appends one raw (unscaled) observation.
    pub fn push(&mut self, raw: &FeatureVector, label: Label, source: Provenance, date: String) {
        self.features.push(self.bounds.scale(raw));
        self.labels.push(label);
        self.sources.push(source);
        self.dates.push(date);
    }

    pub fn load_csv(&mut self, path: impl AsRef<Path>) -> FusionResult<usize> {
        let file = std::fs::File::open(path)?;
        self.read_csv(file)
    }

    /// Reads `;`-delimited rows with a header line. Returns the number of rows added.
    pub fn read_csv<R: Read>(&mut self, reader: R) -> FusionResult<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut added = 0;
        for row in reader.deserialize::<HistoryRow>() {
            let row = row?;
            let raw = FeatureVector([
                row.size,
                row.speed,
                row.deltav,
                row.target_strength,
                row.time_of_day,
                row.current,
            ]);
            self.push(&raw, row.classification, row.source, row.date);
            added += 1;
        }
        Ok(added)
    }

    pub fn save_csv(&self, path: impl AsRef<Path>) -> FusionResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }

    /// Writes the table back out with unscaled features.
    pub fn write_csv<W: Write>(&self, writer: W) -> FusionResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(writer);
        for index in 0..self.len() {
            let raw = self.bounds.unscale(&self.features[index]);
            writer.serialize(HistoryRow {
                source: self.sources[index].clone(),
                date: self.dates[index].clone(),
                size: raw.0[0],
                speed: raw.0[1],
                deltav: raw.0[2],
                target_strength: raw.0[3],
                time_of_day: raw.0[4],
                current: raw.0[5],
                classification: self.labels[index].clone(),
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// RFC 3339 rendering of a record timestamp for the `date` column.
pub fn history_date(timestamp: Timestamp) -> String {
    let seconds = timestamp.floor() as i64;
    let nanos = ((timestamp - timestamp.floor()) * 1e9) as u32;
    DateTime::from_timestamp(seconds, nanos)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
