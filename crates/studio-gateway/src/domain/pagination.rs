//! Page slicing for gallery listings.

use shared_types::Page;

/// Slice `items` into 1-based pages of `per_page`.
///
/// Out-of-range requests are clamped to the first or last page rather than
/// returning an empty page. An empty listing is page 1 of 0.
pub fn paginate<T>(items: Vec<T>, requested: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(per_page);
    let page = requested.clamp(1, total_pages.max(1));

    let start = (page - 1) * per_page;
    let items: Vec<T> = items.into_iter().skip(start).take(per_page).collect();

    Page {
        items,
        page,
        per_page,
        total_items,
        total_pages,
        has_prev: page > 1,
        has_next: page < total_pages,
    }
}
