//! CSV loaders for already-exported registry and map files.
//!
//! Bad rows are skipped with a warning and counted; only structural problems
//! (unreadable CSV, missing columns) are errors.

use std::collections::HashMap;

use crate::config::{RegistrySource, SegmentSource};
use crate::error::LinkError;
use crate::model::{LinkInput, MapSegment, Point, StreetRecord};
use crate::normalize::normalize_locality;

/// Records that survived loading, plus how many rows were dropped.
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub rejected: usize,
}

fn column_index(headers: &[String], source: &str, name: &str) -> Result<usize, LinkError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| LinkError::MissingColumn {
            source: source.into(),
            column: name.into(),
        })
}

fn read_headers<R: std::io::Read>(reader: &mut csv::Reader<R>) -> Result<Vec<String>, LinkError> {
    Ok(reader
        .headers()
        .map_err(|e| LinkError::Io(e.to_string()))?
        .iter()
        // Excel exports lead with a BOM.
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect())
}

fn csv_reader(csv_data: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes())
}

/// Load registry rows, grouping rows that share (normalized locality, official
/// id) into one record. The first non-empty name is canonical; the rest are
/// synonyms. The record keeps the first row's locality label.
pub fn load_registry(csv_data: &str, source: &RegistrySource) -> Result<Loaded<StreetRecord>, LinkError> {
    let mut reader = csv_reader(csv_data);
    let headers = read_headers(&mut reader)?;

    let col = &source.columns;
    let id_idx = column_index(&headers, "registry", &col.official_id)?;
    let name_idx = column_index(&headers, "registry", &col.name)?;
    let locality_idx = column_index(&headers, "registry", &col.locality)?;
    let synonyms_idx = match &col.synonyms {
        Some(name) => Some(column_index(&headers, "registry", name)?),
        None => None,
    };

    struct Group {
        official_id: String,
        locality: String,
        names: Vec<String>,
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut by_key: HashMap<(String, String), usize> = HashMap::new();
    let mut rejected = 0;

    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| LinkError::Io(e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let official_id = field(id_idx);
        let locality = field(locality_idx);
        if official_id.is_empty() || locality.is_empty() {
            log::warn!("registry row {}: missing official_id or locality, skipped", line + 2);
            rejected += 1;
            continue;
        }

        let key = (normalize_locality(locality), official_id.to_string());
        let slot = *by_key.entry(key).or_insert_with(|| {
            groups.push(Group {
                official_id: official_id.to_string(),
                locality: locality.to_string(),
                names: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.names.push(field(name_idx).to_string());
        if let Some(si) = synonyms_idx {
            group
                .names
                .extend(field(si).split('|').map(|s| s.trim().to_string()));
        }
    }

    let mut records = Vec::with_capacity(groups.len());
    for group in groups {
        let mut names = group.names.into_iter().filter(|n| !n.is_empty());
        let canonical = names.next().unwrap_or_default();
        match StreetRecord::new(group.official_id, canonical, names, group.locality) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!("{e}, skipped");
                rejected += 1;
            }
        }
    }

    log::info!("registry: {} streets loaded, {} rows rejected", records.len(), rejected);
    Ok(Loaded { records, rejected })
}

/// Load map segments. Rows with a missing id or locality, or an unparseable
/// geometry, are skipped.
pub fn load_segments(csv_data: &str, source: &SegmentSource) -> Result<Loaded<MapSegment>, LinkError> {
    let mut reader = csv_reader(csv_data);
    let headers = read_headers(&mut reader)?;

    let col = &source.columns;
    let id_idx = column_index(&headers, "segments", &col.segment_id)?;
    let name_idx = column_index(&headers, "segments", &col.name)?;
    let locality_idx = column_index(&headers, "segments", &col.locality)?;
    let geometry_idx = column_index(&headers, "segments", &col.geometry)?;

    let mut records = Vec::new();
    let mut rejected = 0;

    for record in reader.records() {
        let record = record.map_err(|e| LinkError::Io(e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or("");

        let segment = parse_geometry(field(id_idx).trim(), field(geometry_idx)).and_then(|geometry| {
            MapSegment::new(field(id_idx), field(name_idx), field(locality_idx), geometry)
        });
        match segment {
            Ok(segment) => records.push(segment),
            Err(e) => {
                log::warn!("{e}, skipped");
                rejected += 1;
            }
        }
    }

    log::info!("segments: {} loaded, {} rows rejected", records.len(), rejected);
    Ok(Loaded { records, rejected })
}

/// Load both sources into one engine input.
pub fn load_input(
    registry_csv: &str,
    registry: &RegistrySource,
    segments_csv: &str,
    segments: &SegmentSource,
) -> Result<LinkInput, LinkError> {
    let registry = load_registry(registry_csv, registry)?;
    let segments = load_segments(segments_csv, segments)?;
    Ok(LinkInput {
        rejected_records: registry.rejected + segments.rejected,
        registry: registry.records,
        segments: segments.records,
    })
}

/// Parse `LINESTRING (x y, x y, ...)` or bare `x y, x y` pairs. An empty value
/// (or `LINESTRING EMPTY`) is an empty geometry.
pub fn parse_geometry(segment_id: &str, value: &str) -> Result<Vec<Point>, LinkError> {
    let fail = || LinkError::GeometryParse {
        segment_id: segment_id.into(),
        value: value.into(),
    };

    let text = value.trim();
    let body = match text.get(..10) {
        Some(prefix) if prefix.eq_ignore_ascii_case("LINESTRING") => {
            let rest = text[10..].trim();
            let rest = ["ZM", "Z", "M"]
                .iter()
                .find_map(|tag| rest.strip_prefix(tag))
                .map_or(rest, str::trim_start);
            if rest.eq_ignore_ascii_case("EMPTY") {
                return Ok(Vec::new());
            }
            rest.strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(fail)?
        }
        _ => text,
    };

    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    body.split(',')
        .map(|pair| {
            let coords: Vec<f64> = pair
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<Result<_, _>>()
                .map_err(|_| fail())?;
            match coords.as_slice() {
                // A trailing Z (or M) value is ignored.
                [x, y] | [x, y, _] if x.is_finite() && y.is_finite() => Ok(Point::new(*x, *y)),
                _ => Err(fail()),
            }
        })
        .collect()
}
