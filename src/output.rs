use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::record::{CSV_HEADER, PostRecord};

pub fn output_path(output_dir: &Path, handle: &str) -> PathBuf {
    output_dir.join(format!("{handle}_posts.csv"))
}

/// Write `records` to `path` in crawl order, replacing any previous file.
pub fn write_records(path: &Path, records: &[PostRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    if records.is_empty() {
        writer
            .write_record(CSV_HEADER)
            .context("write csv header")?;
    }
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("write row for {}", record.post_url))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use tempfile::tempdir;

    fn record(n: u64, is_video: bool) -> PostRecord {
        PostRecord {
            post_url: format!("https://www.instagram.com/p/code{n}/"),
            date: Some(chrono::Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
            likes: n * 10,
            comments_count: n,
            is_video,
        }
    }

    #[test]
    fn path_is_deterministic_per_handle_and_dir() {
        let dir = Path::new("out");
        assert_eq!(
            output_path(dir, "samplebrand"),
            PathBuf::from("out/samplebrand_posts.csv")
        );
        assert_eq!(
            output_path(dir, "samplebrand"),
            output_path(dir, "samplebrand")
        );
        assert_ne!(output_path(dir, "a"), output_path(Path::new("other"), "a"));
    }

    #[test]
    fn writes_header_and_rows_in_order() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested/dir/x_posts.csv");
        let mut missing_date = record(2, true);
        missing_date.date = None;
        write_records(&path, &[record(1, false), missing_date]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "post_url,date,likes,comments_count,is_video");
        assert_eq!(
            lines[1],
            "https://www.instagram.com/p/code1/,2024-03-01T08:00:00Z,10,1,false"
        );
        assert_eq!(lines[2], "https://www.instagram.com/p/code2/,,20,2,true");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn rewrite_replaces_previous_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("x_posts.csv");
        write_records(&path, &[record(1, false), record(2, false), record(3, false)]).unwrap();
        write_records(&path, &[record(4, false)]).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        assert_eq!(rdr.records().count(), 1);
    }

    #[test]
    fn empty_slice_still_gets_header() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("empty_posts.csv");
        write_records(&path, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim_end(),
            "post_url,date,likes,comments_count,is_video"
        );
    }
}
