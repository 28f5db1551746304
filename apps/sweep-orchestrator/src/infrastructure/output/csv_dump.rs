//! Local CSV dump of a finalized result table.

use std::path::Path;

use crate::sweep::{FinalTable, SinkWriteError};

/// Write `table` to `path`, header row first, replacing any existing file.
pub fn write_table(path: &Path, table: &FinalTable) -> Result<(), SinkWriteError> {
    let local_error = |message: String| SinkWriteError::Local {
        path: path.display().to_string(),
        message,
    };

    let mut writer = csv::Writer::from_path(path).map_err(|e| local_error(e.to_string()))?;

    writer
        .write_record(table.header())
        .map_err(|e| local_error(e.to_string()))?;
    for record in table.records() {
        writer
            .write_record(record.iter().map(ToString::to_string))
            .map_err(|e| local_error(e.to_string()))?;
    }

    writer.flush().map_err(|e| local_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::{AggregatedTable, ParameterPoint, RankMetric, ResultRow, TrialStats};

    fn table() -> AggregatedTable {
        let mut table =
            AggregatedTable::new(vec!["fear_and_greed".to_string(), "volatility".to_string()]);
        for (i, (fear, profitable)) in [(5, 0.6), (6, 0.8)].into_iter().enumerate() {
            table.push(ResultRow {
                point: ParameterPoint::new(
                    i,
                    vec![("fear_and_greed".to_string(), fear), ("volatility".to_string(), 36)],
                ),
                stats: TrialStats {
                    percent_profitable: profitable,
                    total_positions: 150,
                    percent_liquidated: 0.1,
                    percent_unprofitable: 0.3,
                },
            });
        }
        table
    }

    #[test]
    fn writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        write_table(&path, &table().finalize(None)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "fear_and_greed,volatility,percent_profitable,total_positions,percent_liquidated,percent_unprofitable"
        );
        assert_eq!(lines[1], "5,36,0.6,150,0.1,0.3");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn ranked_table_has_rank_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranked.csv");

        write_table(&path, &table().finalize(Some(RankMetric::PercentProfitable))).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().get(6), Some("rank"));
        let ranks: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(6).unwrap().to_string())
            .collect();
        assert_eq!(ranks, vec!["2", "1"]);
    }

    #[test]
    fn empty_table_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        write_table(&path, &AggregatedTable::new(vec!["a".to_string()]).finalize(None)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn missing_directory_is_a_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("results.csv");

        let err = write_table(&path, &table().finalize(None)).unwrap_err();
        assert!(matches!(err, SinkWriteError::Local { .. }));
    }
}
