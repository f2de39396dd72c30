//! Cubby Storage Tools
//!
//! Mock business lookups the voice agent can call: order status, storage
//! unit availability, and reservation booking. They are pure, synchronous
//! functions; [`storage_tools`] exposes them through a [`ToolRegistry`].

use crate::tools::ToolRegistry;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, de};

pub const LOCATIONS: [&str; 4] = ["Downtown", "Midtown", "Airport", "Suburbs"];
pub const SIZES: [&str; 4] = [
    "Small (5x5)",
    "Medium (10x10)",
    "Large (10x20)",
    "Extra Large (20x20)",
];
const FEATURES: [&str; 4] = [
    "Climate-controlled",
    "24/7 access",
    "Security cameras",
    "On-site manager",
];
const ORDER_STATUSES: [&str; 3] = ["processing", "shipped", "delivered"];
const SHIPMENT_METHODS: [&str; 4] = ["standard", "express", "next day", "international"];
const DEFAULT_MONTHLY_RATE: u32 = 125;
pub const RESERVATION_PREFIX: &str = "CUB";

// --- Tool results ---

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OrderStatus {
    pub order_id: String,
    pub status: String,
    pub order_date: String,
    pub shipment_method: String,
    pub estimated_delivery: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Availability {
    pub location: String,
    pub size: String,
    pub available_units: u32,
    pub price_per_month: String,
    pub features: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Reservation {
    pub reservation_id: String,
    pub customer_name: String,
    pub size: String,
    pub location: String,
    pub start_date: String,
    pub duration_months: u32,
    pub monthly_rate: String,
    pub total_cost: String,
    pub status: String,
    pub unit_number: String,
    pub access_code: String,
}

// --- Tool arguments ---

#[derive(Deserialize, JsonSchema, Debug)]
pub struct OrderStatusArgs {
    #[schemars(description = "The order ID to look up")]
    pub order_id: String,
}

#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct AvailabilityArgs {
    #[schemars(
        description = "Storage unit size (e.g., 'Small (5x5)', 'Medium (10x10)', 'Large (10x20)')"
    )]
    #[serde(default)]
    pub size: Option<String>,
    #[schemars(
        description = "Location preference (e.g., 'Downtown', 'Midtown', 'Airport', 'Suburbs')"
    )]
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct ReservationArgs {
    #[schemars(description = "Name of the customer")]
    pub customer_name: String,
    #[schemars(description = "Storage unit size")]
    pub size: String,
    #[schemars(description = "Preferred location")]
    pub location: String,
    #[schemars(description = "When the rental starts (YYYY-MM-DD format)")]
    pub start_date: String,
    #[schemars(description = "How many months to book", with = "u32")]
    #[serde(deserialize_with = "whole_months")]
    pub duration_months: u32,
}

// The model sometimes encodes integers as floats (`3.0`).
fn whole_months<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value) {
        Ok(value as u32)
    } else {
        Err(de::Error::custom(format!(
            "duration_months must be a whole number of months, got {}",
            value
        )))
    }
}

/// Builds the registry holding the three storage tools.
pub fn storage_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            "get_order_status",
            "Get the current status and details of an order",
            |args: OrderStatusArgs| Ok(get_order_status(&args.order_id)),
        )
        .register(
            "check_storage_availability",
            "Check available storage units by size and location",
            |args: AvailabilityArgs| {
                Ok(check_storage_availability(
                    args.size.as_deref(),
                    args.location.as_deref(),
                ))
            },
        )
        .register(
            "book_storage_reservation",
            "Create a new storage reservation for a customer",
            |args: ReservationArgs| {
                Ok(book_storage_reservation(
                    &args.customer_name,
                    &args.size,
                    &args.location,
                    &args.start_date,
                    args.duration_months,
                ))
            },
        );
    registry
}

/// Looks up an order. Unknown ids get deterministic pseudo-random details
/// seeded by the id, so repeated lookups agree.
pub fn get_order_status(order_id: &str) -> OrderStatus {
    if order_id == "SH1005" {
        return OrderStatus {
            order_id: order_id.to_string(),
            status: "shipped".to_string(),
            order_date: "2024-05-20".to_string(),
            shipment_method: "express".to_string(),
            estimated_delivery: Some("2024-05-30".to_string()),
            shipped_date: Some("2024-05-25".to_string()),
            delivered_date: None,
            items: Some(vec![
                "Vanilla candles".to_string(),
                "BOKHYLLA Stor".to_string(),
            ]),
        };
    }

    let seed: u64 = order_id.chars().map(|c| c as u64).sum();
    let mut rng = StdRng::seed_from_u64(seed);

    let status = *ORDER_STATUSES.choose(&mut rng).unwrap_or(&"processing");
    let shipment = *SHIPMENT_METHODS.choose(&mut rng).unwrap_or(&"standard");
    let order_date = format!("2024-05-{:02}", rng.random_range(12..=28));

    let (estimated_delivery, shipped_date, delivered_date) = match status {
        "shipped" => {
            let shipped = format!("2024-05-{:02}", rng.random_range(1..=28));
            let estimated = format!("2024-06-{:02}", rng.random_range(1..=15));
            (Some(estimated), Some(shipped), None)
        }
        "delivered" => {
            let shipped = format!("2024-05-{:02}", rng.random_range(1..=20));
            let delivered = format!("2024-05-{:02}", rng.random_range(21..=28));
            (None, Some(shipped), Some(delivered))
        }
        _ => (
            Some(format!("2024-06-{:02}", rng.random_range(1..=15))),
            None,
            None,
        ),
    };

    OrderStatus {
        order_id: order_id.to_string(),
        status: status.to_string(),
        order_date,
        shipment_method: shipment.to_string(),
        estimated_delivery,
        shipped_date,
        delivered_date,
        items: None,
    }
}

pub fn check_storage_availability(size: Option<&str>, location: Option<&str>) -> Availability {
    check_storage_availability_with(&mut rand::rng(), size, location)
}

fn check_storage_availability_with<R: Rng + ?Sized>(
    rng: &mut R,
    size: Option<&str>,
    location: Option<&str>,
) -> Availability {
    let location = match location.filter(|l| !l.is_empty()) {
        Some(l) => l.to_string(),
        None => LOCATIONS.choose(rng).unwrap_or(&LOCATIONS[0]).to_string(),
    };
    let size = match size.filter(|s| !s.is_empty()) {
        Some(s) => s.to_string(),
        None => SIZES.choose(rng).unwrap_or(&SIZES[0]).to_string(),
    };

    Availability {
        location,
        size,
        available_units: rng.random_range(1..=15),
        price_per_month: format!("${}", rng.random_range(50..=300)),
        features: FEATURES.iter().map(|f| f.to_string()).collect(),
    }
}

/// Monthly rate in dollars for a unit size; unknown sizes bill as Medium.
pub fn monthly_rate(size: &str) -> u32 {
    match size {
        "Small (5x5)" => 75,
        "Medium (10x10)" => 125,
        "Large (10x20)" => 200,
        "Extra Large (20x20)" => 300,
        _ => DEFAULT_MONTHLY_RATE,
    }
}

pub fn book_storage_reservation(
    customer_name: &str,
    size: &str,
    location: &str,
    start_date: &str,
    duration_months: u32,
) -> Reservation {
    let mut rng = rand::rng();
    let rate = monthly_rate(size);

    Reservation {
        reservation_id: format!("{}{}", RESERVATION_PREFIX, rng.random_range(1000..=9999)),
        customer_name: customer_name.to_string(),
        size: size.to_string(),
        location: location.to_string(),
        start_date: start_date.to_string(),
        duration_months,
        monthly_rate: format!("${}", rate),
        total_cost: format!("${}", rate as u64 * duration_months as u64),
        status: "confirmed".to_string(),
        unit_number: format!("Unit {}", rng.random_range(100..=999)),
        access_code: rng.random_range(1000..=9999).to_string(),
    }
}
