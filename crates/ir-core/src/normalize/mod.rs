//! Source normalization: heterogeneous delimited files to canonical events.
//!
//! Raw test records arrive as flat delimited files whose delimiter and
//! column names drifted across vintages. Normalization is two-phase:
//!
//! 1. **Schema contract** (strict, per source): the header is matched
//!    against a tolerated alias set per column role. A source missing any
//!    required role is rejected wholesale with a structural error; partial
//!    ingestion of a misshapen source would silently bias counts.
//! 2. **Row parsing** (lenient, per record): malformed individual rows are
//!    dropped or degraded locally and counted, never raised.
//!
//! Sources are streamed line by line; nothing here materializes a whole
//! file.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use ir_common::{Error, Result, TestOutcome, VehicleId};

use crate::event::TestEvent;

/// Roles a source column can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    VehicleId,
    TestDate,
    Outcome,
    Mileage,
    FirstRegistration,
    Category,
    Make,
    Model,
    Regime,
    Powertrain,
    RecordId,
    DefectCategories,
}

impl ColumnRole {
    /// Roles a source must provide to satisfy its schema contract.
    pub const REQUIRED: [ColumnRole; 3] =
        [ColumnRole::VehicleId, ColumnRole::TestDate, ColumnRole::Outcome];

    fn field_name(self) -> &'static str {
        match self {
            ColumnRole::VehicleId => "vehicle_id",
            ColumnRole::TestDate => "test_date",
            ColumnRole::Outcome => "outcome",
            ColumnRole::Mileage => "mileage",
            ColumnRole::FirstRegistration => "first_registration",
            ColumnRole::Category => "category",
            ColumnRole::Make => "make",
            ColumnRole::Model => "model",
            ColumnRole::Regime => "regime",
            ColumnRole::Powertrain => "powertrain",
            ColumnRole::RecordId => "record_id",
            ColumnRole::DefectCategories => "defect_categories",
        }
    }
}

/// Header alias patterns per role, compiled once.
///
/// Aliases cover the column-name drift observed across source vintages.
fn header_patterns() -> &'static Vec<(ColumnRole, Regex)> {
    static PATTERNS: OnceLock<Vec<(ColumnRole, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: [(ColumnRole, &str); 12] = [
            (ColumnRole::VehicleId, r"^(vehicle_?id|veh_?id|vid)$"),
            (ColumnRole::TestDate, r"^(test_?date|date_?of_?test|insp_?date)$"),
            (ColumnRole::Outcome, r"^(outcome|test_?result|result_?code|result)$"),
            (ColumnRole::Mileage, r"^(mileage|test_?mileage|odometer(_?reading)?)$"),
            (
                ColumnRole::FirstRegistration,
                r"^(first_?reg(istration)?(_?date)?|first_?use_?date|reg_?date)$",
            ),
            (ColumnRole::Category, r"^(category|vehicle_?class|test_?class(_?id)?)$"),
            (ColumnRole::Make, r"^(make|manufacturer)$"),
            (ColumnRole::Model, r"^(model|model_?name)$"),
            (ColumnRole::Regime, r"^(regime|scheme|jurisdiction)$"),
            (ColumnRole::Powertrain, r"^(powertrain|fuel_?type|propulsion)$"),
            (ColumnRole::RecordId, r"^(record_?id|test_?id|row_?id)$"),
            (
                ColumnRole::DefectCategories,
                r"^(defect_?categories|defects|rfr_?categories)$",
            ),
        ];
        table
            .into_iter()
            .map(|(role, pat)| (role, Regex::new(pat).expect("header alias pattern is valid")))
            .collect()
    })
}

/// Detect the delimiter from a header line.
///
/// Picks whichever of comma, pipe, tab occurs most often; defaults to comma.
pub fn detect_delimiter(header: &str) -> char {
    let candidates = [',', '|', '\t'];
    candidates
        .into_iter()
        .max_by_key(|c| header.matches(*c).count())
        .filter(|c| header.contains(*c))
        .unwrap_or(',')
}

/// Resolved per-source column layout.
#[derive(Debug, Clone)]
pub struct SourceSchema {
    pub source: String,
    pub delimiter: char,
    columns: HashMap<ColumnRole, usize>,
}

impl SourceSchema {
    /// Match a header line against the alias set.
    ///
    /// Fails with a structural error if any required role is missing; this
    /// rejects the whole source.
    pub fn from_header(source: &str, header: &str) -> Result<Self> {
        let delimiter = detect_delimiter(header);
        let mut columns = HashMap::new();

        for (idx, raw_name) in header.split(delimiter).enumerate() {
            let name = raw_name.trim().trim_matches('"').to_ascii_lowercase();
            for (role, pattern) in header_patterns() {
                if pattern.is_match(&name) {
                    // First match wins; later duplicate columns are ignored.
                    columns.entry(*role).or_insert(idx);
                    break;
                }
            }
        }

        for role in ColumnRole::REQUIRED {
            if !columns.contains_key(&role) {
                return Err(Error::MissingField {
                    source_name: source.to_string(),
                    field: role.field_name().to_string(),
                });
            }
        }

        Ok(SourceSchema {
            source: source.to_string(),
            delimiter,
            columns,
        })
    }

    fn get<'a>(&self, fields: &'a [&'a str], role: ColumnRole) -> Option<&'a str> {
        self.columns
            .get(&role)
            .and_then(|&idx| fields.get(idx))
            .map(|s| s.trim().trim_matches('"'))
            .filter(|s| !s.is_empty())
    }
}

/// Drop/degrade counters for one source (mergeable across sources).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCounters {
    pub rows_read: u64,
    pub rows_emitted: u64,
    pub dropped_short_row: u64,
    pub dropped_bad_vehicle_id: u64,
    pub dropped_bad_date: u64,
    pub degraded_unknown_outcome: u64,
    pub degraded_bad_mileage: u64,
    pub degraded_bad_registration: u64,
}

impl IngestCounters {
    /// Total rows dropped (not emitted at all).
    pub fn dropped(&self) -> u64 {
        self.dropped_short_row + self.dropped_bad_vehicle_id + self.dropped_bad_date
    }

    /// Merge counters from another source or chunk. Associative and
    /// commutative, so chunk order never affects the totals.
    pub fn merge(&mut self, other: &IngestCounters) {
        self.rows_read += other.rows_read;
        self.rows_emitted += other.rows_emitted;
        self.dropped_short_row += other.dropped_short_row;
        self.dropped_bad_vehicle_id += other.dropped_bad_vehicle_id;
        self.dropped_bad_date += other.dropped_bad_date;
        self.degraded_unknown_outcome += other.degraded_unknown_outcome;
        self.degraded_bad_mileage += other.degraded_bad_mileage;
        self.degraded_bad_registration += other.degraded_bad_registration;
    }
}

/// Parse a date in any of the formats seen across vintages.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%Y%m%d", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

/// Streaming normalizer over one delimited source.
///
/// Yields canonical events; malformed rows are counted, never yielded.
pub struct NormalizedSource<R: BufRead> {
    schema: SourceSchema,
    lines: std::io::Lines<R>,
    counters: IngestCounters,
    next_fallback_record_id: u64,
}

impl<R: BufRead> NormalizedSource<R> {
    /// Open a source: reads the header line and binds the schema contract.
    ///
    /// An empty source or an unsatisfiable header is a structural error.
    pub fn open(source: &str, reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(Error::NoInput(format!("source '{}' is empty", source))),
        };
        let schema = SourceSchema::from_header(source, &header)?;
        tracing::debug!(source = %source, delimiter = %schema.delimiter, "source schema bound");

        Ok(NormalizedSource {
            schema,
            lines,
            counters: IngestCounters::default(),
            next_fallback_record_id: 1,
        })
    }

    /// Counters accumulated so far (complete once iteration finishes).
    pub fn counters(&self) -> IngestCounters {
        self.counters
    }

    /// The bound schema (for diagnostics).
    pub fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn parse_row(&mut self, line: &str) -> Option<TestEvent> {
        let fields: Vec<&str> = line.split(self.schema.delimiter).collect();

        let max_required_idx = ColumnRole::REQUIRED
            .iter()
            .filter_map(|r| self.schema.columns.get(r))
            .copied()
            .max()
            .unwrap_or(0);
        if fields.len() <= max_required_idx {
            self.counters.dropped_short_row += 1;
            return None;
        }

        let vehicle_id = match self
            .schema
            .get(&fields, ColumnRole::VehicleId)
            .and_then(VehicleId::parse)
        {
            Some(id) => id,
            None => {
                self.counters.dropped_bad_vehicle_id += 1;
                return None;
            }
        };

        let test_date = match self
            .schema
            .get(&fields, ColumnRole::TestDate)
            .and_then(parse_date)
        {
            Some(d) => d,
            None => {
                self.counters.dropped_bad_date += 1;
                return None;
            }
        };

        // Outcome parsing is total; unknown codes degrade, they never drop.
        let raw_outcome = self.schema.get(&fields, ColumnRole::Outcome).unwrap_or("");
        let outcome = TestOutcome::parse(raw_outcome);
        if outcome == TestOutcome::Unknown {
            self.counters.degraded_unknown_outcome += 1;
        }

        let mileage = match self.schema.get(&fields, ColumnRole::Mileage) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(m) => Some(m),
                Err(_) => {
                    self.counters.degraded_bad_mileage += 1;
                    None
                }
            },
            None => None,
        };

        let first_registration = match self.schema.get(&fields, ColumnRole::FirstRegistration) {
            Some(raw) => match parse_date(raw) {
                Some(d) => Some(d),
                None => {
                    self.counters.degraded_bad_registration += 1;
                    None
                }
            },
            None => None,
        };

        let source_record_id = self
            .schema
            .get(&fields, ColumnRole::RecordId)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(self.next_fallback_record_id);

        let own = |role| {
            self.schema
                .get(&fields, role)
                .map(|s: &str| s.to_string())
        };

        let defect_categories = self
            .schema
            .get(&fields, ColumnRole::DefectCategories)
            .map(|s| {
                s.split(';')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Some(TestEvent {
            vehicle_id,
            source_record_id,
            test_date,
            outcome,
            category: own(ColumnRole::Category).unwrap_or_else(|| "car".to_string()),
            mileage,
            first_registration,
            regime: own(ColumnRole::Regime),
            powertrain: own(ColumnRole::Powertrain),
            make: own(ColumnRole::Make),
            model: own(ColumnRole::Model),
            defect_categories,
        })
    }
}

impl<R: BufRead> Iterator for NormalizedSource<R> {
    type Item = Result<TestEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            self.counters.rows_read += 1;
            self.next_fallback_record_id = self.counters.rows_read;
            if let Some(event) = self.parse_row(&line) {
                self.counters.rows_emitted += 1;
                return Some(Ok(event));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(source: &str, content: &str) -> (Vec<TestEvent>, IngestCounters) {
        let mut src = NormalizedSource::open(source, Cursor::new(content.to_string())).unwrap();
        let mut events = Vec::new();
        while let Some(item) = src.next() {
            events.push(item.unwrap());
        }
        (events, src.counters())
    }

    #[test]
    fn parses_comma_delimited_vintage() {
        let content = "\
vehicle_id,test_date,result,mileage,first_reg_date,make,model
123,2023-06-01,FAIL,54000,2015-03-20,ACME,Roadster
456,2023-06-02,P,23000,2019-11-02,ACME,Citycar
";
        let (events, counters) = collect("2023.csv", content);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].vehicle_id, VehicleId(123));
        assert_eq!(events[0].outcome, TestOutcome::Fail);
        assert_eq!(events[0].mileage, Some(54000));
        assert_eq!(events[1].outcome, TestOutcome::Pass);
        assert_eq!(counters.rows_emitted, 2);
        assert_eq!(counters.dropped(), 0);
    }

    #[test]
    fn parses_pipe_delimited_vintage_with_aliases() {
        let content = "\
VEH_ID|DATE_OF_TEST|TEST_RESULT|ODOMETER_READING|FIRST_USE_DATE
77|15/03/2022|F|88000|01/06/2010
";
        let (events, _) = collect("2022.psv", content);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].vehicle_id, VehicleId(77));
        assert_eq!(
            events[0].test_date,
            NaiveDate::from_ymd_opt(2022, 3, 15).unwrap()
        );
        assert_eq!(events[0].mileage, Some(88000));
    }

    #[test]
    fn malformed_rows_drop_without_error() {
        let content = "\
vehicle_id,test_date,result
123,2023-06-01,PASS
NOT_A_VID,2023-06-02,PASS
456,junk-date,FAIL
789
999,2023-06-03,WEIRD_CODE
";
        let (events, counters) = collect("messy.csv", content);
        assert_eq!(events.len(), 2);
        assert_eq!(counters.rows_read, 5);
        assert_eq!(counters.dropped_bad_vehicle_id, 1);
        assert_eq!(counters.dropped_bad_date, 1);
        assert_eq!(counters.dropped_short_row, 1);
        assert_eq!(counters.degraded_unknown_outcome, 1);
        assert_eq!(events[1].outcome, TestOutcome::Unknown);
    }

    #[test]
    fn missing_required_column_rejects_source() {
        let content = "vehicle_id,mileage\n123,50000\n";
        let err = NormalizedSource::open("bad.csv", Cursor::new(content.to_string()))
            .err()
            .expect("schema contract should fail");
        match err {
            Error::MissingField { source_name: source, field } => {
                assert_eq!(source, "bad.csv");
                assert_eq!(field, "test_date");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_source_is_structural() {
        let err = NormalizedSource::open("empty.csv", Cursor::new(String::new()))
            .err()
            .expect("empty source should fail");
        assert!(matches!(err, Error::NoInput(_)));
    }

    #[test]
    fn bad_mileage_degrades_to_none() {
        let content = "vehicle_id,test_date,result,mileage\n123,2023-06-01,PASS,unknown\n";
        let (events, counters) = collect("deg.csv", content);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].mileage, None);
        assert_eq!(counters.degraded_bad_mileage, 1);
    }

    #[test]
    fn defect_categories_split_on_semicolon() {
        let content = "vehicle_id,test_date,result,defects\n123,2023-06-01,FAIL,brakes; lighting\n";
        let (events, _) = collect("def.csv", content);
        assert_eq!(events[0].defect_categories, vec!["brakes", "lighting"]);
    }

    #[test]
    fn counters_merge_is_commutative() {
        let a = IngestCounters {
            rows_read: 10,
            rows_emitted: 8,
            dropped_bad_date: 2,
            ..Default::default()
        };
        let b = IngestCounters {
            rows_read: 5,
            rows_emitted: 5,
            ..Default::default()
        };
        let mut ab = a;
        ab.merge(&b);
        let mut ba = b;
        ba.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.rows_read, 15);
    }

    #[test]
    fn delimiter_detection() {
        assert_eq!(detect_delimiter("a,b,c"), ',');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("single_column"), ',');
    }
}
