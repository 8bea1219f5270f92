//! Delimited datafile reading and shaping
//!
//! Expected layout: a header row with a `time` column, an `id` column naming
//! the replicate, and one or more observed-variable columns. A column whose
//! header ends in `!` is a replicate-level constant (e.g. `n0!`): its value
//! must not change within a replicate and it is carried into
//! [Constants](super::Constants) rather than treated as an observation.
//! Lines starting with `#` are ignored.

use std::path::Path;

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::routines::data::{Constants, ReplicatePolicy, ReplicateSet, TimeSeries};

/// One parsed datafile row
#[derive(Debug, Clone)]
pub struct Row {
    pub id: String,
    pub time: f64,
    /// Observed values, in variable column order
    pub values: Vec<f64>,
    /// Constant values, in constant column order
    pub constants: Vec<f64>,
}

/// The parsed datafile: rows plus the column names they correspond to
#[derive(Debug, Clone)]
pub struct RawData {
    pub variables: Vec<String>,
    pub constant_names: Vec<String>,
    pub rows: Vec<Row>,
}

/// Read a delimited datafile into [RawData]
pub fn read_datafile(path: &Path) -> Result<RawData> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let time_col = headers
        .iter()
        .position(|h| h == "time" || h == "t")
        .ok_or_else(|| Error::Parse("datafile has no 'time' column".to_string()))?;
    let id_col = headers
        .iter()
        .position(|h| h == "id" || h == "replicate")
        .ok_or_else(|| Error::Parse("datafile has no 'id' column".to_string()))?;

    // Remaining columns are observed variables, unless flagged as constants
    let mut variables: Vec<String> = Vec::new();
    let mut constant_names: Vec<String> = Vec::new();
    let mut var_cols: Vec<usize> = Vec::new();
    let mut const_cols: Vec<usize> = Vec::new();
    for (i, h) in headers.iter().enumerate() {
        if i == time_col || i == id_col {
            continue;
        }
        if let Some(name) = h.strip_suffix('!') {
            constant_names.push(name.to_string());
            const_cols.push(i);
        } else {
            variables.push(h.clone());
            var_cols.push(i);
        }
    }
    if variables.is_empty() {
        return Err(Error::Parse(
            "datafile has no observed-variable columns".to_string(),
        ));
    }

    let mut rows: Vec<Row> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |col: usize| -> Result<f64> {
            record
                .get(col)
                .ok_or_else(|| Error::Parse(format!("row {}: missing column {}", line + 2, col)))?
                .parse::<f64>()
                .map_err(|_| {
                    Error::Parse(format!(
                        "row {}: cannot parse '{}' as a number",
                        line + 2,
                        &record[col]
                    ))
                })
        };
        let id = record
            .get(id_col)
            .ok_or_else(|| Error::Parse(format!("row {}: missing id", line + 2)))?
            .to_string();
        rows.push(Row {
            id,
            time: field(time_col)?,
            values: var_cols.iter().map(|&c| field(c)).collect::<Result<_>>()?,
            constants: const_cols
                .iter()
                .map(|&c| field(c))
                .collect::<Result<_>>()?,
        });
    }

    Ok(RawData {
        variables,
        constant_names,
        rows,
    })
}

/// Shape raw rows into a [ReplicateSet] according to the replicate policy
///
/// Replicates appear in order of first appearance in the datafile. All shape
/// validation happens here: equal grid lengths for a joint fit, at least two
/// observations per replicate, strictly increasing times, and constants that
/// are actually constant within a replicate.
pub fn shape(raw: &RawData, policy: &ReplicatePolicy) -> Result<ReplicateSet> {
    // Group rows by replicate, preserving first-appearance order
    let mut order: Vec<String> = Vec::new();
    for row in &raw.rows {
        if !order.contains(&row.id) {
            order.push(row.id.clone());
        }
    }

    let selected: Vec<String> = match policy {
        ReplicatePolicy::All => order,
        ReplicatePolicy::Single(id) => {
            if !order.contains(id) {
                return Err(Error::Parse(format!(
                    "requested replicate '{}' not present in datafile",
                    id
                )));
            }
            vec![id.clone()]
        }
    };

    let mut replicates: Vec<TimeSeries> = Vec::new();
    for id in &selected {
        let rows: Vec<&Row> = raw.rows.iter().filter(|r| &r.id == id).collect();

        let times: Vec<f64> = rows.iter().map(|r| r.time).collect();
        let mut obs = Array2::zeros((rows.len(), raw.variables.len()));
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.values.iter().enumerate() {
                obs[(i, j)] = v;
            }
        }

        let mut constants = Constants::new();
        for (j, name) in raw.constant_names.iter().enumerate() {
            let value = rows[0].constants[j];
            if rows.iter().any(|r| r.constants[j] != value) {
                return Err(Error::Validation(format!(
                    "constant '{}' varies within replicate '{}'",
                    name, id
                )));
            }
            constants.insert(name.clone(), value);
        }

        replicates.push(TimeSeries::new(id.clone(), times, obs, constants)?);
    }

    ReplicateSet::new(replicates, raw.variables.clone())
}
