//! Google Sheets backend: Sheets v4 values API plus the Drive v3 revision
//! history, over blocking HTTP with a bearer token.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use sheetgate_core::{A1Range, Grid};
use sheetgate_sync::{RevisionEntry, RowSpan, SpreadsheetStore, SyncError};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const TIMEOUT: Duration = Duration::from_secs(60);

pub struct GoogleSheets {
    agent: ureq::Agent,
    bearer: String,
    document_id: String,
    /// Sheet title → numeric sheet id, fetched on first row delete.
    sheet_ids: Option<BTreeMap<String, i64>>,
}

impl GoogleSheets {
    pub fn new(spreadsheet_url: &str, token: &str) -> Result<Self, SyncError> {
        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
            bearer: format!("Bearer {}", token.trim()),
            document_id: document_id(spreadsheet_url)?,
            sheet_ids: None,
        })
    }

    fn sheets_url(&self, segments: &[&str]) -> Result<Url, SyncError> {
        endpoint(SHEETS_API, segments)
    }

    fn get(
        &self,
        operation: &'static str,
        url: &Url,
        query: &[(&str, &str)],
    ) -> Result<ureq::Response, SyncError> {
        let mut request = self
            .agent
            .request_url("GET", url)
            .set("Authorization", &self.bearer);
        for (k, v) in query {
            request = request.query(k, v);
        }
        request.call().map_err(|e| failure(operation, e))
    }

    fn post(
        &self,
        operation: &'static str,
        url: &Url,
        query: &[(&str, &str)],
        body: serde_json::Value,
    ) -> Result<(), SyncError> {
        let mut request = self
            .agent
            .request_url("POST", url)
            .set("Authorization", &self.bearer);
        for (k, v) in query {
            request = request.query(k, v);
        }
        request
            .send_json(body)
            .map(|_| ())
            .map_err(|e| failure(operation, e))
    }

    fn sheet_id(&mut self, title: &str) -> Result<i64, SyncError> {
        if self.sheet_ids.is_none() {
            let url = self.sheets_url(&[self.document_id.as_str()])?;
            let response = self.get("list sheets", &url, &[("fields", "sheets.properties")])?;
            let listing: SpreadsheetInfo = decode("list sheets", response)?;
            self.sheet_ids = Some(
                listing
                    .sheets
                    .into_iter()
                    .map(|s| (s.properties.title, s.properties.sheet_id))
                    .collect(),
            );
        }
        self.sheet_ids
            .as_ref()
            .and_then(|ids| find_sheet(ids, title))
            .ok_or_else(|| SyncError::Spreadsheet {
                operation: "delete rows",
                message: format!("no sheet named '{title}'"),
            })
    }
}

impl SpreadsheetStore for GoogleSheets {
    fn document_id(&self) -> &str {
        &self.document_id
    }

    fn read(&self, range: &A1Range) -> Result<Grid, SyncError> {
        let target = range.to_string();
        let url = self.sheets_url(&[self.document_id.as_str(), "values", target.as_str()])?;
        let response = self.get(
            "read",
            &url,
            &[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "FORMATTED_VALUE"),
            ],
        )?;
        let values: ValueRange = decode("read", response)?;
        Ok(values.values)
    }

    fn batch_update(&mut self, data: &[(A1Range, Grid)]) -> Result<(), SyncError> {
        let ranges: Vec<_> = data
            .iter()
            .map(|(range, values)| {
                json!({ "range": range.to_string(), "majorDimension": "ROWS", "values": values })
            })
            .collect();
        let url = self.sheets_url(&[self.document_id.as_str(), "values:batchUpdate"])?;
        self.post(
            "update",
            &url,
            &[],
            json!({ "valueInputOption": "USER_ENTERED", "data": ranges }),
        )
    }

    fn append(&mut self, range: &A1Range, rows: &Grid) -> Result<(), SyncError> {
        let target = format!("{range}:append");
        let url = self.sheets_url(&[self.document_id.as_str(), "values", target.as_str()])?;
        self.post(
            "append",
            &url,
            &[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ],
            json!({ "range": range.to_string(), "majorDimension": "ROWS", "values": rows }),
        )
    }

    fn batch_clear(&mut self, ranges: &[A1Range]) -> Result<(), SyncError> {
        let ranges: Vec<String> = ranges.iter().map(ToString::to_string).collect();
        let url = self.sheets_url(&[self.document_id.as_str(), "values:batchClear"])?;
        self.post("clear", &url, &[], json!({ "ranges": ranges }))
    }

    fn delete_rows(&mut self, sheet: &str, spans: &[RowSpan]) -> Result<(), SyncError> {
        if spans.is_empty() {
            return Ok(());
        }
        let sheet_id = self.sheet_id(sheet)?;
        let requests: Vec<_> = spans
            .iter()
            .map(|span| {
                json!({
                    "deleteDimension": {
                        "range": {
                            "sheetId": sheet_id,
                            "dimension": "ROWS",
                            "startIndex": span.start,
                            "endIndex": span.end,
                        }
                    }
                })
            })
            .collect();
        let target = format!("{}:batchUpdate", self.document_id);
        let url = self.sheets_url(&[target.as_str()])?;
        self.post("delete rows", &url, &[], json!({ "requests": requests }))
    }

    fn list_revisions(&self) -> Result<Vec<RevisionEntry>, SyncError> {
        let url = endpoint(DRIVE_API, &[self.document_id.as_str(), "revisions"])?;
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("fields", "nextPageToken,revisions(id,modifiedTime)"),
                ("pageSize", "1000"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let response = self.get("list revisions", &url, &query)?;
            let page: RevisionPage = decode("list revisions", response)?;
            entries.extend(page.revisions.into_iter().map(|r| RevisionEntry {
                id: r.id,
                modified: r.modified_time,
            }));
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(entries)
    }
}

/// Extract the document id from `https://docs.google.com/spreadsheets/d/<id>/…`.
pub fn document_id(spreadsheet_url: &str) -> Result<String, SyncError> {
    let invalid = || SyncError::Spreadsheet {
        operation: "open",
        message: format!("not a spreadsheet URL: {spreadsheet_url}"),
    };
    let url = Url::parse(spreadsheet_url).map_err(|_| invalid())?;
    let mut segments = url.path_segments().ok_or_else(invalid)?;
    segments
        .by_ref()
        .find(|s| *s == "d")
        .and_then(|_| segments.next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(invalid)
}

/// Sheet titles are matched trimmed and ignoring case.
fn find_sheet(ids: &BTreeMap<String, i64>, title: &str) -> Option<i64> {
    let wanted = title.trim();
    ids.iter()
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
        .map(|(_, &id)| id)
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url, SyncError> {
    let invalid = || SyncError::Spreadsheet {
        operation: "request",
        message: format!("cannot build URL from {base}"),
    };
    let mut url = Url::parse(base).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .extend(segments);
    Ok(url)
}

fn failure(operation: &'static str, e: ureq::Error) -> SyncError {
    let message = match e {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            format!("HTTP {code}: {}", body.trim())
        }
        other => other.to_string(),
    };
    SyncError::Spreadsheet { operation, message }
}

fn decode<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    response: ureq::Response,
) -> Result<T, SyncError> {
    response
        .into_json()
        .map_err(|e| SyncError::Spreadsheet {
            operation,
            message: format!("unexpected response: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Grid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionPage {
    #[serde(default)]
    revisions: Vec<DriveRevision>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveRevision {
    id: String,
    modified_time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SpreadsheetInfo {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}
