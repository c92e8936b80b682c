//! Source URL templates
//!
//! Source URLs may carry `${page}` and `${date}` placeholders. Paginated
//! sources without a `${page}` placeholder get the page number as a query
//! parameter instead.

use chrono::{NaiveDate, Utc};
use url::Url;

/// Placeholder replaced by the page number
pub const PAGE_PLACEHOLDER: &str = "${page}";

/// Placeholder replaced by the current UTC date (`YYYY-MM-DD`)
pub const DATE_PLACEHOLDER: &str = "${date}";

/// Page selection for a paginated source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParam<'a> {
    /// The page number to request
    pub number: u32,

    /// Query parameter used when the template has no `${page}` placeholder
    pub param_name: &'a str,
}

/// Resolves a URL template into a concrete URL
///
/// With `page == None` a `${page}` placeholder resolves to `1`, which keeps
/// templated URLs of non-paginated sources valid.
///
/// # Examples
///
/// ```
/// use web_aggregator::url::{resolve_template, PageParam};
///
/// let url = resolve_template("https://example.com/news?page=${page}", None).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/news?page=1");
///
/// let page = PageParam { number: 3, param_name: "p" };
/// let url = resolve_template("https://example.com/news?sort=new", Some(page)).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/news?sort=new&p=3");
/// ```
pub fn resolve_template(
    template: &str,
    page: Option<PageParam<'_>>,
) -> Result<Url, url::ParseError> {
    resolve_template_on(template, page, Utc::now().date_naive())
}

fn resolve_template_on(
    template: &str,
    page: Option<PageParam<'_>>,
    today: NaiveDate,
) -> Result<Url, url::ParseError> {
    let mut raw = template.replace(DATE_PLACEHOLDER, &today.format("%Y-%m-%d").to_string());

    if raw.contains(PAGE_PLACEHOLDER) {
        let number = page.map(|p| p.number).unwrap_or(1);
        raw = raw.replace(PAGE_PLACEHOLDER, &number.to_string());
        return Url::parse(&raw);
    }

    let mut url = Url::parse(&raw)?;
    if let Some(page) = page {
        set_query_param(&mut url, page.param_name, &page.number.to_string());
    }
    Ok(url)
}

/// Sets a query parameter, replacing any existing values for the same key
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(key, value);
}
