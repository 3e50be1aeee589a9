//! Reader for the solver's whitespace-separated statistics files.
//!
//! Column names come from the header comments (`# 2: Time (years)`), so
//! columns are looked up by name rather than by a hard-coded index.

use std::path::Path;

use nalgebra::DVector;
use tracing::debug;

use crate::datatypes::{BenchmarkSeries, TimeUnit};
use crate::error::{Result, VeBenchError};

#[derive(Debug, Clone)]
pub struct StatisticsTable {
    source: String,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

/// Parses a `# <n>: <name>` header line into its 1-based index and name
fn parse_header(line: &str) -> Option<(usize, String)> {
    let rest = line.trim_start().strip_prefix('#')?;
    let (index, name) = rest.split_once(':')?;
    let index: usize = index.trim().parse().ok()?;
    Some((index, name.trim().to_string()))
}

impl StatisticsTable {
    /// Parses statistics-file text
    ///
    /// # Arguments
    /// * `contents` - The file contents
    /// * `source` - A name for the contents, used in error messages
    pub fn parse(contents: &str, source: &str) -> Result<StatisticsTable> {
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<f64>> = Vec::new();

        for (line_no, line) in contents.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with('#') {
                if let Some((index, name)) = parse_header(trimmed) {
                    if index == 0 || index != columns.len() + 1 {
                        return Err(VeBenchError::Shape {
                            path: source.to_string(),
                            line: line_no + 1,
                            message: format!(
                                "header column {index} out of order, expected {}",
                                columns.len() + 1
                            ),
                        });
                    }
                    columns.push(name);
                }
                continue;
            }

            let mut row: Vec<f64> = Vec::with_capacity(columns.len());
            for cell in trimmed.split_whitespace() {
                match cell.parse::<f64>() {
                    Ok(v) => row.push(v),
                    Err(_) => {
                        return Err(VeBenchError::Shape {
                            path: source.to_string(),
                            line: line_no + 1,
                            message: format!("'{cell}' is not a number"),
                        })
                    }
                }
            }

            if !columns.is_empty() && row.len() != columns.len() {
                return Err(VeBenchError::Shape {
                    path: source.to_string(),
                    line: line_no + 1,
                    message: format!(
                        "expected {} columns, found {}",
                        columns.len(),
                        row.len()
                    ),
                });
            }
            rows.push(row);
        }

        if columns.is_empty() {
            return Err(VeBenchError::Data(format!(
                "{source} has no column headers"
            )));
        }

        debug!(
            source,
            columns = columns.len(),
            rows = rows.len(),
            "parsed statistics"
        );

        Ok(StatisticsTable {
            source: source.to_string(),
            columns,
            rows,
        })
    }

    pub fn read(path: &Path) -> Result<StatisticsTable> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                return Err(VeBenchError::Data(format!(
                    "Unable to read statistics file {}: {err}",
                    path.display()
                )))
            }
        };
        StatisticsTable::parse(&contents, &path.display().to_string())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column with exactly this name
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name.trim())
            .ok_or_else(|| VeBenchError::MissingColumn(name.to_string()))
    }

    /// Index of the column whose name contains `fragment`
    ///
    /// An exact name match wins; otherwise the fragment must match exactly
    /// one column.
    pub fn find_column(&self, fragment: &str) -> Result<usize> {
        if let Ok(idx) = self.column_index(fragment) {
            return Ok(idx);
        }

        let fragment = fragment.trim();
        let matches: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.contains(fragment))
            .map(|(i, _)| i)
            .collect();

        match matches.len() {
            0 => Err(VeBenchError::MissingColumn(fragment.to_string())),
            1 => Ok(matches[0]),
            _ => Err(VeBenchError::AmbiguousColumn {
                fragment: fragment.to_string(),
                candidates: matches.iter().map(|i| self.columns[*i].clone()).collect(),
            }),
        }
    }

    /// Values of the column with exactly this name
    pub fn column(&self, name: &str) -> Result<DVector<f64>> {
        let idx = self.column_index(name)?;
        Ok(self.values(idx))
    }

    fn values(&self, idx: usize) -> DVector<f64> {
        DVector::from_iterator(self.rows.len(), self.rows.iter().map(|r| r[idx]))
    }

    /// Builds a (time, value) series from two columns
    ///
    /// # Arguments
    /// * `time_column` - Fragment identifying the time column
    /// * `value_column` - Fragment identifying the value column
    /// * `time_unit` - Unit of the time column
    pub fn series(
        &self,
        time_column: &str,
        value_column: &str,
        time_unit: TimeUnit,
    ) -> Result<BenchmarkSeries> {
        let time_idx = self.find_column(time_column)?;
        let value_idx = self.find_column(value_column)?;

        Ok(BenchmarkSeries {
            name: self.columns[value_idx].clone(),
            time: self.values(time_idx),
            values: self.values(value_idx),
            time_unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    const STATISTICS: &str = "\
# 1: Time step number
# 2: Time (years)
# 3: Time step size (years)
# 4: Minimal value for composition ve_stress_xx
# 5: Maximal value for composition ve_stress_xx
# 6: Minimal value for composition ve_stress_yy
0 0.000000000000e+00 0.000000000000e+00 2.00790500e+07 2.00790500e+07 -2.00790500e+07
1 1.250000000000e+02 1.250000000000e+02 1.99999990e+07 1.99999990e+07 -1.99999990e+07

2 2.500000000000e+02 1.250000000000e+02 1.99210450e+07 1.99210450e+07 -1.99210450e+07
";

    #[test]
    fn columns_are_named_from_the_header() {
        let table = StatisticsTable::parse(STATISTICS, "statistics").unwrap();
        assert_eq!(table.columns().len(), 6);
        assert_eq!(table.len(), 3);
        assert_eq!(table.column_index("Time (years)").unwrap(), 1);
        let time = table.column("Time (years)").unwrap();
        assert_relative_eq!(time[2], 250.);
    }

    #[test]
    fn fragments_must_be_unique() {
        let table = StatisticsTable::parse(STATISTICS, "statistics").unwrap();
        assert_eq!(table.find_column("Minimal value for composition ve_stress_xx").unwrap(), 3);
        assert_eq!(table.find_column("stress_yy").unwrap(), 5);
        assert!(matches!(
            table.find_column("ve_stress_xx"),
            Err(VeBenchError::AmbiguousColumn { ref candidates, .. }) if candidates.len() == 2
        ));
        assert!(matches!(
            table.find_column("shear heating"),
            Err(VeBenchError::MissingColumn(_))
        ));
        // "Time" is a fragment of three columns; the exact name still works
        assert!(table.find_column("Time").is_err());
        assert_eq!(table.find_column("Time (years)").unwrap(), 1);
    }

    #[test]
    fn series_from_two_columns() {
        let table = StatisticsTable::parse(STATISTICS, "statistics").unwrap();
        let series = table
            .series("Time (years)", "Minimal value for composition ve_stress_xx", TimeUnit::Years)
            .unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.name, "Minimal value for composition ve_stress_xx");
        assert_relative_eq!(series.values[0], 20079050.);
        assert_relative_eq!(series.seconds()[1], 125. * crate::units::SECONDS_PER_YEAR);
    }

    #[test]
    fn short_rows_name_the_line() {
        let broken = STATISTICS.replace(
            "2 2.500000000000e+02 1.250000000000e+02 1.99210450e+07 1.99210450e+07 -1.99210450e+07",
            "2 2.500000000000e+02",
        );
        match StatisticsTable::parse(&broken, "statistics") {
            Err(VeBenchError::Shape { line, .. }) => assert_eq!(line, 10),
            other => panic!("expected a shape error, got {other:?}"),
        }
    }

    #[test]
    fn read_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("statistics");
        std::fs::write(&path, STATISTICS).unwrap();
        let table = StatisticsTable::read(&path).unwrap();
        assert_eq!(table.source(), path.display().to_string());

        assert!(matches!(
            StatisticsTable::read(&dir.path().join("missing")),
            Err(VeBenchError::Data(_))
        ));
    }
}
