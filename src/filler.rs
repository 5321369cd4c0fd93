//! Synthetic names and prices for products whose page content is missing.

use rand::Rng;

use crate::scraper::ProductRecord;

pub const BRANDS: &[&str] = &[
    "Apple", "Samsung", "Xiaomi", "Huawei", "Nike", "Adidas", "IKEA", "MUJI", "Zara", "H&M",
    "Chanel", "Dior", "Gucci", "Prada", "Nestle", "Coca-Cola", "Pepsi", "Starbucks", "Under Armour",
];

pub const ADJECTIVES: &[&str] = &[
    "Small", "Ergonomic", "Rustic", "Intelligent", "Gorgeous", "Incredible", "Fantastic",
    "Practical", "Sleek", "Awesome", "Generic", "Handcrafted", "Handmade", "Licensed", "Refined",
    "Unbranded", "Tasty", "Elegant", "Modern", "Luxurious", "Bespoke", "Oriental",
];

pub const CATEGORIES: &[&str] = &[
    // electronics
    "Smart Watch", "Wireless Earbuds", "Bluetooth Speaker", "Fitness Band", "Power Bank",
    // home
    "Sofa", "Mattress", "Table", "Chair", "Wardrobe",
    // clothing
    "Shirt", "Trousers", "Jacket", "Dress", "Shoes",
    // beauty
    "Lipstick", "Face Cream", "Serum", "Perfume", "Skincare Set",
    // food
    "Chocolate", "Biscuits", "Coffee", "Tea", "Hickory Nuts",
    // sports
    "Running Shoes", "Yoga Mat", "Gym Equipment", "Bicycle", "Basketball",
];

/// Generic words pages (and older scraper versions) use for unnamed items
pub const GENERIC_TYPES: &[&str] = &[
    "Product", "Item", "Gadget", "Device", "Accessory", "Tool", "Gear", "Equipment",
];

pub const CAMERA_PRODUCTS: &[&str] = &[
    "DJI Mini 3 Pro", "DJI Air 2S", "DJI Mavic 3", "DJI FPV", "DJI Phantom 4 Pro V2.0",
    "DJI Inspire 2", "DJI Matrice 300 RTK", "DJI Avata", "DJI Mini 3", "DJI Mavic 3 Classic",
    "DJI Mavic 3 Cine", "DJI Mini 2", "DJI Mini SE", "DJI Mavic Air 2", "DJI Mavic 2 Pro",
];

const UNKNOWN_NAME_MARKERS: &[&str] = &["未知名称", "Unknown", "N/A"];
const UNKNOWN_PRICE_MARKERS: &[&str] = &["未知价格", "Unknown", "N/A"];
const ARTIFACT_NAME_PREFIXES: &[&str] = &["Product", "Item", "Gadget", "Device"];
const PRICE_PLACEHOLDER: &str = "#price_placeholder_";

/// A generated name/price pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticProduct {
    pub name: String,
    pub price: String,
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, words: &[&'a str]) -> &'a str {
    words[rng.gen_range(0..words.len())]
}

/// `<Brand> <Adjective> <Category>` with a rupee price between 1,000 and 50,000
pub fn generate_product<R: Rng + ?Sized>(rng: &mut R) -> SyntheticProduct {
    let name = format!(
        "{} {} {}",
        pick(rng, BRANDS),
        pick(rng, ADJECTIVES),
        pick(rng, CATEGORIES)
    );
    let price = format!("Rs. {}", format_inr(rng.gen_range(1_000..=50_000)));

    SyntheticProduct { name, price }
}

/// Rupee price between 9,999 and 50,000
pub fn generate_camera_price<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("Rs. {}", format_inr(rng.gen_range(9_999..=50_000)))
}

/// Camera name for the `index`-th image, cycling through the vocabulary
pub fn camera_name(index: usize) -> &'static str {
    CAMERA_PRODUCTS[index % CAMERA_PRODUCTS.len()]
}

/// Group digits the Indian way: last three, then pairs (`12,34,567`)
pub fn format_inr(value: u64) -> String {
    let digits = value.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}

/// Whether a scraped name is missing or a placeholder
pub fn is_artifact_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty()
        || name.contains('#')
        || UNKNOWN_NAME_MARKERS.contains(&name)
        || ARTIFACT_NAME_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Whether a scraped price is missing or a placeholder
pub fn is_artifact_price(price: &str) -> bool {
    let price = price.trim();
    price.is_empty() || price.contains(PRICE_PLACEHOLDER) || UNKNOWN_PRICE_MARKERS.contains(&price)
}

/// Replace artifact name and price with generated values. Returns true when anything changed.
pub fn fill<R: Rng + ?Sized>(record: &mut ProductRecord, rng: &mut R) -> bool {
    let name_missing = is_artifact_name(&record.name);
    let price_missing = is_artifact_price(&record.price);
    if !name_missing && !price_missing {
        return false;
    }

    let synthetic = generate_product(rng);
    if name_missing {
        record.name = synthetic.name;
    }
    if price_missing {
        record.price = synthetic.price;
    }
    true
}
