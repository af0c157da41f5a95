//! MOSMIX forecast retrieval (DWD open data, single-station KMZ files)
//!
//! A KMZ is a ZIP archive wrapping one KML document. The fetcher downloads the
//! archive for a station and hands back the decompressed document bytes.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use std::io::{Cursor, Read};
use std::time::Duration;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::domain::ForecastStation;
use crate::error::{ArchiveError, PipelineError, TransportError};

pub const DEFAULT_BASE_URL: &str =
    "http://opendata.dwd.de/weather/local_forecasts/mos/MOSMIX_L/single_stations";

/// Upper bound for a decompressed forecast document. Single-station MOSMIX_L
/// documents are a few MiB.
pub const MAX_DOCUMENT_BYTES: u64 = 64 << 20;

/// Source of raw forecast documents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch_document(&self, station: &ForecastStation) -> Result<Vec<u8>, PipelineError>;
}

/// HTTP client for the MOSMIX_L "latest" single-station files
#[derive(Clone)]
pub struct MosmixFetcher {
    base_url: String,
    client: Client,
}

impl MosmixFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("pv-mode-advisor/0.2"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn url_for(&self, station: &ForecastStation) -> String {
        format!(
            "{}/{station}/kml/MOSMIX_L_LATEST_{station}.kmz",
            self.base_url.trim_end_matches('/'),
        )
    }
}

#[async_trait]
impl ForecastSource for MosmixFetcher {
    async fn fetch_document(&self, station: &ForecastStation) -> Result<Vec<u8>, PipelineError> {
        let url = self.url_for(station);
        debug!(%url, "fetching MOSMIX archive");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(TransportError::from)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            }
            .into());
        }
        let body = resp.bytes().await.map_err(TransportError::from)?;

        let document = extract_forecast_document(&body)?;
        info!(
            %station,
            archive_bytes = body.len(),
            document_bytes = document.len(),
            "fetched forecast document"
        );
        Ok(document)
    }
}

/// Pull the forecast document out of a KMZ archive.
///
/// The first `.kml` entry wins; archives without one fall back to their first entry.
pub fn extract_forecast_document(archive_bytes: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    if archive.len() == 0 {
        return Err(ArchiveError::Empty);
    }

    let mut selected = None;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_file() && entry.name().to_ascii_lowercase().ends_with(".kml") {
            selected = Some(i);
            break;
        }
    }

    let mut entry = archive.by_index(selected.unwrap_or(0))?;
    if !entry.is_file() {
        return Err(ArchiveError::MissingEntry);
    }
    let name = entry.name().to_string();
    let too_large = || ArchiveError::TooLarge {
        name: name.clone(),
        limit: MAX_DOCUMENT_BYTES,
    };
    // declared size is untrusted, so the read below is capped as well
    if entry.size() > MAX_DOCUMENT_BYTES {
        return Err(too_large());
    }

    let mut document = Vec::with_capacity(entry.size() as usize);
    (&mut entry)
        .take(MAX_DOCUMENT_BYTES + 1)
        .read_to_end(&mut document)
        .map_err(|source| ArchiveError::Read {
            name: name.clone(),
            source,
        })?;
    if document.len() as u64 > MAX_DOCUMENT_BYTES {
        return Err(too_large());
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_url_for_station() {
        let fetcher = MosmixFetcher::new(DEFAULT_BASE_URL, Duration::from_secs(30)).unwrap();
        let station = ForecastStation::new("P444").unwrap();
        assert_eq!(
            fetcher.url_for(&station),
            "http://opendata.dwd.de/weather/local_forecasts/mos/MOSMIX_L/single_stations/P444/kml/MOSMIX_L_LATEST_P444.kmz"
        );
    }

    #[test]
    fn test_url_tolerates_trailing_slash() {
        let fetcher = MosmixFetcher::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        let station = ForecastStation::new("10637").unwrap();
        assert_eq!(
            fetcher.url_for(&station),
            "http://localhost:8080/10637/kml/MOSMIX_L_LATEST_10637.kmz"
        );
    }

    #[test]
    fn test_extract_prefers_kml_entry() {
        let bytes = build_archive(&[
            ("readme.txt", &b"not this one"[..]),
            ("MOSMIX_L_2024060103_P444.kml", &b"<kml/>"[..]),
        ]);
        assert_eq!(extract_forecast_document(&bytes).unwrap(), b"<kml/>");
    }

    #[test]
    fn test_extract_falls_back_to_first_entry() {
        let bytes = build_archive(&[
            ("forecast.xml", &b"<doc/>"[..]),
            ("other.xml", &b"<x/>"[..]),
        ]);
        assert_eq!(extract_forecast_document(&bytes).unwrap(), b"<doc/>");
    }

    #[test]
    fn test_extract_empty_archive() {
        let bytes = build_archive(&[]);
        assert!(matches!(
            extract_forecast_document(&bytes),
            Err(ArchiveError::Empty)
        ));
    }

    #[test]
    fn test_extract_directory_only_archive() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.add_directory("kml/", FileOptions::default()).unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(
            extract_forecast_document(&bytes),
            Err(ArchiveError::MissingEntry)
        ));
    }

    /// Single stored `f.kml` whose central directory claims, via a zip64 extra
    /// field, an uncompressed size of `declared` bytes.
    fn archive_with_declared_size(declared: u64) -> Vec<u8> {
        const NAME: &[u8] = b"f.kml";
        const DATA: &[u8] = b"<kml/>";

        // borrow the CRC from a well-formed archive of the same entry
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("f.kml", options).unwrap();
        zip.write_all(DATA).unwrap();
        let reference = zip.finish().unwrap().into_inner();
        let crc = &reference[14..18];

        let len = DATA.len() as u32;
        let mut out = Vec::new();
        // local file header
        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&[0; 6]); // flags, method (stored), mod time
        out.extend_from_slice(&0x0021u16.to_le_bytes()); // mod date
        out.extend_from_slice(crc);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(NAME.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(NAME);
        out.extend_from_slice(DATA);

        // central directory
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes()); // version made by
        out.extend_from_slice(&45u16.to_le_bytes()); // version needed
        out.extend_from_slice(&[0; 6]);
        out.extend_from_slice(&0x0021u16.to_le_bytes());
        out.extend_from_slice(crc);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes()); // size lives in the zip64 extra
        out.extend_from_slice(&(NAME.len() as u16).to_le_bytes());
        out.extend_from_slice(&12u16.to_le_bytes()); // extra length
        out.extend_from_slice(&[0; 6]); // comment length, disk, internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        out.extend_from_slice(NAME);
        out.extend_from_slice(&0x0001u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&declared.to_le_bytes());
        let cd_size = out.len() as u32 - cd_offset;

        // end of central directory
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_extract_rejects_oversized_declared_entry() {
        let bytes = archive_with_declared_size(0x7FFF_FFFF_FFFF_FFFF);
        match extract_forecast_document(&bytes) {
            Err(ArchiveError::TooLarge { name, limit }) => {
                assert_eq!(name, "f.kml");
                assert_eq!(limit, MAX_DOCUMENT_BYTES);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_honest_zip64_size() {
        let bytes = archive_with_declared_size(6);
        assert_eq!(extract_forecast_document(&bytes).unwrap(), b"<kml/>");
    }

    #[test]
    fn test_extract_garbage_is_malformed() {
        assert!(matches!(
            extract_forecast_document(b"<html>502 Bad Gateway</html>"),
            Err(ArchiveError::Malformed(_))
        ));
    }
}
