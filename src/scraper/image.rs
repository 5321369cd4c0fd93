//! Image listing scraper: one record per `<img>` on the page.

use rand::Rng;
use url::Url;

use super::normalize::resolve_url;
use super::page::{PageDriver, RawImage};
use super::{ProductRecord, ScrapeContext};
use crate::error::ScrapeResult;
use crate::filler;
use crate::log_info;

/// Records for every image with a source. Names come from the alt text, else from the
/// camera vocabulary; prices are always synthetic.
pub fn build_image_records<R: Rng + ?Sized>(raw: Vec<RawImage>, base: Option<&Url>, rng: &mut R) -> Vec<ProductRecord> {
    raw.into_iter()
        .filter(|img| !img.src.trim().is_empty())
        .enumerate()
        .map(|(index, img)| {
            let src = img.src.trim();
            let image = base
                .and_then(|base| resolve_url(src, base))
                .unwrap_or_else(|| src.to_string());
            let name = if img.alt.trim().is_empty() {
                filler::camera_name(index).to_string()
            } else {
                img.alt.trim().to_string()
            };

            ProductRecord {
                id: index as u64 + 1,
                name,
                price: filler::generate_camera_price(rng),
                image,
                url: None,
                dimensions: Some(format!("{}x{}", img.width, img.height)),
            }
        })
        .collect()
}

pub async fn scrape<P: PageDriver + ?Sized>(page: &P, ctx: &mut ScrapeContext) -> ScrapeResult<Vec<ProductRecord>> {
    let raw = page.extract_images().await?;
    let base = page.current_url().await.ok().and_then(|u| Url::parse(&u).ok());
    let records = build_image_records(raw, base.as_ref(), &mut ctx.rng);

    let log = ctx.log.clone().with_number_field("records", records.len() as i64);
    log_info!(log, format!("Collected {} images", records.len()));
    Ok(records)
}
