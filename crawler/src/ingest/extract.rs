//! Field extraction from poiskzoo.ru catalog and listing pages.

use crate::model::{CatalogEntry, EventType, ListingId, PetCard, Sex, Species};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use crawler_core::{Error, Result};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

/// Clock times on listing pages are Moscow time.
const SITE_UTC_OFFSET_SECS: i32 = 3 * 3600;

const TILE: &str = "div.pzplitkadiv";
const TILE_LINK: &str = "div.pzplitkalink a[href]";
const TITLE: &str = "h1";
const FIELD_ROW: &str = "table.pzinfo tr";
const FIELD_CELL: &str = "td, th";
const COMMENT: &str = "div.pzcomment";
const SMALL_PHOTO: &str = r#"img[src*="/images/board/small/"]"#;

const CITY_LABEL: &str = "город";
const ADDRESS_LABEL: &str = "адрес";
const DATE_LABEL: &str = "дата";
const SEX_LABEL: &str = "пол";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::parse("selector", format!("{css}: {e}")))
}

/// Whitespace-collapsed text content of an element.
fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lowercase_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tiles of a catalog page in document order.
pub fn catalog_entries(doc: &Html) -> Result<Vec<CatalogEntry>> {
    let tile_sel = selector(TILE)?;
    let link_sel = selector(TILE_LINK)?;

    let mut entries = Vec::new();
    for tile in doc.select(&tile_sel) {
        let Some(href) = tile
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };

        let promoted = tile
            .value()
            .classes()
            .any(|c| c.contains("vip") || c.contains("premium"));

        entries.push(CatalogEntry {
            id: listing_id_from_href(href)?,
            url: href.to_string(),
            promoted,
        });
    }
    Ok(entries)
}

/// The id is the leading digits of the last path segment (`/bijsk/propala-koshka/162257`).
pub fn listing_id_from_href(href: &str) -> Result<ListingId> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();

    digits
        .parse()
        .map_err(|_| Error::parse("catalog entry", format!("no listing id in href {href}")))
}

fn title(doc: &Html) -> Result<String> {
    let sel = selector(TITLE)?;
    doc.select(&sel)
        .next()
        .map(text_of)
        .ok_or_else(|| Error::parse("title", "listing page has no heading"))
}

pub fn species(doc: &Html) -> Result<Species> {
    let title = title(doc)?;
    lowercase_words(&title)
        .iter()
        .find_map(|w| species_of_word(w))
        .ok_or_else(|| Error::parse("species", format!("unrecognized title {title:?}")))
}

fn species_of_word(word: &str) -> Option<Species> {
    if word.starts_with("кош")
        || word == "кот"
        || word.starts_with("котик")
        || word.starts_with("котён")
        || word.starts_with("котен")
    {
        Some(Species::Cat)
    } else if word.starts_with("собак")
        || word.starts_with("собач")
        || word == "пес"
        || word == "пёс"
        || word.starts_with("щен")
    {
        Some(Species::Dog)
    } else if word.starts_with("птиц") || word.starts_with("попуга") {
        Some(Species::Bird)
    } else {
        None
    }
}

pub fn event_type(doc: &Html) -> Result<EventType> {
    let title = title(doc)?;
    lowercase_words(&title)
        .iter()
        .find_map(|w| {
            if w.starts_with("пропал") || w.starts_with("потерял") || w.starts_with("потерян") {
                Some(EventType::Lost)
            } else if w.starts_with("найден") || w.starts_with("нашл") {
                Some(EventType::Found)
            } else {
                None
            }
        })
        .ok_or_else(|| Error::parse("event type", format!("unrecognized title {title:?}")))
}

/// Label/value rows of the listing info table, labels lowercased without the trailing colon.
fn labelled_fields(doc: &Html) -> Result<Vec<(String, String)>> {
    let row_sel = selector(FIELD_ROW)?;
    let cell_sel = selector(FIELD_CELL)?;

    let mut fields = Vec::new();
    for row in doc.select(&row_sel) {
        let mut cells = row.select(&cell_sel).map(text_of);
        if let (Some(label), Some(value)) = (cells.next(), cells.next()) {
            let label = label.trim_end_matches(':').trim().to_lowercase();
            fields.push((label, value));
        }
    }
    Ok(fields)
}

fn field(fields: &[(String, String)], label: &str) -> Option<String> {
    fields
        .iter()
        .find(|(l, _)| l == label)
        .map(|(_, v)| v.clone())
}

pub fn sex(doc: &Html) -> Result<Sex> {
    let fields = labelled_fields(doc)?;
    let Some(value) = field(&fields, SEX_LABEL) else {
        return Ok(Sex::Unknown);
    };

    let value = value.to_lowercase();
    let sex = if ["мальч", "кобел", "самец", "кот"].iter().any(|p| value.starts_with(p)) {
        Sex::Male
    } else if ["девоч", "сук", "самк", "кошк"].iter().any(|p| value.starts_with(p)) {
        Sex::Female
    } else {
        Sex::Unknown
    };
    Ok(sex)
}

/// City and free-text address; either may be empty.
pub fn city_and_address(doc: &Html) -> Result<(String, String)> {
    let fields = labelled_fields(doc)?;
    Ok((
        field(&fields, CITY_LABEL).unwrap_or_default(),
        field(&fields, ADDRESS_LABEL).unwrap_or_default(),
    ))
}

/// `today_midnight` is the UTC midnight that "сегодня" refers to.
pub fn event_timestamp(doc: &Html, today_midnight: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let fields = labelled_fields(doc)?;
    let raw = field(&fields, DATE_LABEL)
        .ok_or_else(|| Error::parse("event time", "listing page has no date"))?;
    parse_event_time(&raw, today_midnight)
}

/// Accepts `dd.mm.yyyy`, `dd.mm.yyyy HH:MM`, `сегодня HH:MM` and `вчера HH:MM`.
/// Dates without a clock time are taken as UTC midnight.
pub fn parse_event_time(raw: &str, today_midnight: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let normalized = raw.replace(',', " ").to_lowercase();
    let mut tokens = normalized.split_whitespace();
    let invalid = || Error::parse("event time", format!("unrecognized date {raw:?}"));

    let day_token = tokens.next().ok_or_else(invalid)?;
    let today = today_midnight.date_naive();
    let date = match day_token {
        "сегодня" => today,
        "вчера" => today - Duration::days(1),
        other => NaiveDate::parse_from_str(other, "%d.%m.%Y").map_err(|_| invalid())?,
    };

    let Some(time_token) = tokens.next() else {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(Utc.from_utc_datetime(&midnight));
    };
    let time = NaiveTime::parse_from_str(time_token, "%H:%M").map_err(|_| invalid())?;

    let site_tz = FixedOffset::east_opt(SITE_UTC_OFFSET_SECS).ok_or_else(invalid)?;
    site_tz
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(invalid)
}

pub fn comment(doc: &Html) -> Result<String> {
    let sel = selector(COMMENT)?;
    Ok(doc.select(&sel).next().map(text_of).unwrap_or_default())
}

/// Absolute URL of the small listing photo, if the page shows one.
pub fn photo_url(doc: &Html, base: &Url) -> Result<Option<String>> {
    let sel = selector(SMALL_PHOTO)?;
    let Some(src) = doc
        .select(&sel)
        .next()
        .and_then(|img| img.value().attr("src"))
    else {
        return Ok(None);
    };

    let url = base
        .join(src)
        .map_err(|e| Error::parse("photo url", format!("{src}: {e}")))?;
    Ok(Some(url.to_string()))
}

/// Parse a whole listing page.
pub fn parse_card(
    id: ListingId,
    html: &str,
    base: &Url,
    today_midnight: DateTime<Utc>,
) -> Result<PetCard> {
    let doc = Html::parse_document(html);
    let (city, address) = city_and_address(&doc)?;

    Ok(PetCard {
        id,
        species: species(&doc)?,
        sex: sex(&doc)?,
        city,
        address,
        event_time: event_timestamp(&doc, today_midnight)?,
        event_type: event_type(&doc)?,
        comment: comment(&doc)?,
        photo_url: photo_url(&doc, base)?,
    })
}

pub fn parse_catalog(html: &str) -> Result<Vec<CatalogEntry>> {
    catalog_entries(&Html::parse_document(html))
}
