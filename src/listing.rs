//! Decoded catalog listings and the tag codec.
//!
//! A [`CatalogListing`] is the typed view of a record of kind
//! [`RecordKind::CatalogListing`]. The identity, title and price are
//! mandatory; a record missing any of them is not representable as a listing
//! and never enters the projection.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::proto::{DraftRecord, Record, RecordKind};

/// Price of a listing. The amount is a decimal string, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price {
    /// Decimal amount, e.g. `"9.99"`.
    pub amount: String,
    /// ISO currency code, e.g. `"USD"`.
    pub currency: String,
    /// Billing frequency for recurring prices, e.g. `"month"`.
    pub frequency: Option<String>,
}

impl Price {
    /// A one-off price without billing frequency.
    pub fn new(amount: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.into(),
            frequency: None,
        }
    }
}

/// One product image. Order among image tags is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingImage {
    /// Image location.
    pub url: String,
    /// Pixel dimensions, e.g. `"800x600"`.
    pub dimensions: Option<String>,
    /// Explicit sort position.
    pub order: Option<u32>,
}

/// Product weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Weight {
    /// Decimal value, kept verbatim.
    pub value: String,
    /// Unit, e.g. `"kg"`.
    pub unit: String,
}

/// Product dimensions as a free-form string plus unit, e.g. `"10x20x5"` cm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimensions {
    /// The dimension string.
    pub value: String,
    /// Unit, e.g. `"cm"`.
    pub unit: String,
}

/// Listing visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Not shown in storefronts.
    Hidden,
    /// Regular listing.
    #[default]
    OnSale,
    /// Announced but not yet purchasable.
    PreOrder,
}

impl Visibility {
    /// Wire form of the visibility.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Hidden => "hidden",
            Visibility::OnSale => "on-sale",
            Visibility::PreOrder => "pre-order",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "hidden" => Some(Visibility::Hidden),
            "on-sale" => Some(Visibility::OnSale),
            "pre-order" => Some(Visibility::PreOrder),
            _ => None,
        }
    }
}

/// Structural kind of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingKind {
    /// Standalone product.
    #[default]
    Simple,
    /// Product with variations.
    Variable,
    /// One variation of a variable product.
    Variation,
}

impl ListingKind {
    fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Simple => "simple",
            ListingKind::Variable => "variable",
            ListingKind::Variation => "variation",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(ListingKind::Simple),
            "variable" => Some(ListingKind::Variable),
            "variation" => Some(ListingKind::Variation),
            _ => None,
        }
    }
}

/// Whether the product is delivered digitally or shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhysicalType {
    /// Digital delivery.
    Digital,
    /// Physical shipment.
    #[default]
    Physical,
}

impl PhysicalType {
    fn as_str(&self) -> &'static str {
        match self {
            PhysicalType::Digital => "digital",
            PhysicalType::Physical => "physical",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "digital" => Some(PhysicalType::Digital),
            "physical" => Some(PhysicalType::Physical),
            _ => None,
        }
    }
}

/// Combined listing type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListingType {
    /// Structural kind.
    pub kind: ListingKind,
    /// Delivery type.
    pub physical: PhysicalType,
}

/// The decoded view of a catalog listing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogListing {
    /// Stable logical identity, from the `d` tag.
    pub identity: String,
    /// Listing title.
    pub title: String,
    /// Listing price.
    pub price: Price,
    /// Stock count, if tracked.
    pub stock: Option<u32>,
    /// Short summary.
    pub summary: Option<String>,
    /// Free-text description (the record content).
    pub description: String,
    /// Ordered images.
    pub images: Vec<ListingImage>,
    /// Ordered key/value spec pairs.
    pub specs: Vec<(String, String)>,
    /// Weight, if given.
    pub weight: Option<Weight>,
    /// Dimensions, if given.
    pub dimensions: Option<Dimensions>,
    /// Categories; insertion order is not meaningful.
    pub categories: Vec<String>,
    /// Visibility.
    pub visibility: Visibility,
    /// Listing type.
    pub listing_type: ListingType,
    /// Creation timestamp of the backing record.
    pub created_at: u64,
    /// Author identity of the backing record.
    pub author: String,
}

/// Why a record could not be decoded into a [`CatalogListing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeListingError {
    /// The record is not of the catalog listing kind.
    #[error("record is not a catalog listing")]
    WrongKind,
    /// No `d` tag; the record is unusable as a listing.
    #[error("listing has no identity tag")]
    MissingIdentity,
    /// No `title` tag.
    #[error("listing has no title")]
    MissingTitle,
    /// No `price` tag with amount and currency.
    #[error("listing has no price")]
    MissingPrice,
}

impl CatalogListing {
    /// Decodes a listing from its record.
    ///
    /// Fails if the record has the wrong kind or is missing identity, title
    /// or price. All other fields are optional.
    pub fn from_record(record: &Record) -> Result<Self, DecodeListingError> {
        if record.kind != RecordKind::CatalogListing {
            return Err(DecodeListingError::WrongKind);
        }
        let identity = record
            .tag_value("d")
            .filter(|v| !v.is_empty())
            .ok_or(DecodeListingError::MissingIdentity)?
            .to_string();
        let title = record
            .tag_value("title")
            .filter(|v| !v.is_empty())
            .ok_or(DecodeListingError::MissingTitle)?
            .to_string();
        let price = record
            .tags_named("price")
            .next()
            .and_then(|parts| {
                let amount = parts.first()?.clone();
                let currency = parts.get(1)?.clone();
                Some(Price {
                    amount,
                    currency,
                    frequency: parts.get(2).cloned().filter(|f| !f.is_empty()),
                })
            })
            .ok_or(DecodeListingError::MissingPrice)?;

        let images = record
            .tags_named("image")
            .filter_map(|parts| {
                Some(ListingImage {
                    url: parts.first()?.clone(),
                    dimensions: parts.get(1).cloned().filter(|d| !d.is_empty()),
                    order: parts.get(2).and_then(|o| o.parse().ok()),
                })
            })
            .collect();
        let specs = record
            .tags_named("spec")
            .filter_map(|parts| Some((parts.first()?.clone(), parts.get(1)?.clone())))
            .collect();
        let weight = record.tags_named("weight").next().and_then(|parts| {
            Some(Weight {
                value: parts.first()?.clone(),
                unit: parts.get(1)?.clone(),
            })
        });
        let dimensions = record.tags_named("dimensions").next().and_then(|parts| {
            Some(Dimensions {
                value: parts.first()?.clone(),
                unit: parts.get(1)?.clone(),
            })
        });
        let categories = record
            .tags_named("category")
            .filter_map(|parts| parts.first().cloned())
            .collect();
        let listing_type = record
            .tags_named("type")
            .next()
            .map(|parts| ListingType {
                kind: parts
                    .first()
                    .and_then(|s| ListingKind::parse(s))
                    .unwrap_or_default(),
                physical: parts
                    .get(1)
                    .and_then(|s| PhysicalType::parse(s))
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        Ok(CatalogListing {
            identity,
            title,
            price,
            stock: record.tag_value("stock").and_then(|s| s.parse().ok()),
            summary: record
                .tag_value("summary")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            description: record.content.clone(),
            images,
            specs,
            weight,
            dimensions,
            categories,
            visibility: record
                .tag_value("visibility")
                .and_then(Visibility::parse)
                .unwrap_or_default(),
            listing_type,
            created_at: record.created_at,
            author: record.pubkey.clone(),
        })
    }

    /// The editable field set of this listing, used to re-publish it with
    /// changes applied on top.
    pub fn fields(&self) -> ListingFields {
        ListingFields {
            id: Some(self.identity.clone()),
            title: self.title.clone(),
            price: self.price.clone(),
            summary: self.summary.clone(),
            description: self.description.clone(),
            stock: self.stock,
            listing_type: self.listing_type,
            visibility: self.visibility,
            images: self.images.clone(),
            specs: self.specs.clone(),
            weight: self.weight.clone(),
            dimensions: self.dimensions.clone(),
            categories: self.categories.clone(),
        }
    }
}

/// Input for creating or re-publishing a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFields {
    /// Logical identity. `None` lets the store mint a fresh one.
    pub id: Option<String>,
    /// Listing title, required.
    pub title: String,
    /// Listing price, required.
    pub price: Price,
    /// Short summary.
    pub summary: Option<String>,
    /// Free-text description, becomes the record content.
    pub description: String,
    /// Stock count.
    pub stock: Option<u32>,
    /// Listing type.
    pub listing_type: ListingType,
    /// Visibility.
    pub visibility: Visibility,
    /// Ordered images.
    pub images: Vec<ListingImage>,
    /// Ordered spec pairs.
    pub specs: Vec<(String, String)>,
    /// Weight.
    pub weight: Option<Weight>,
    /// Dimensions.
    pub dimensions: Option<Dimensions>,
    /// Categories.
    pub categories: Vec<String>,
}

impl ListingFields {
    /// Fields for a new listing with only the required values set.
    pub fn new(title: impl Into<String>, price: Price) -> Self {
        Self {
            id: None,
            title: title.into(),
            price,
            summary: None,
            description: String::new(),
            stock: None,
            listing_type: ListingType::default(),
            visibility: Visibility::default(),
            images: Vec::new(),
            specs: Vec::new(),
            weight: None,
            dimensions: None,
            categories: Vec::new(),
        }
    }
}

/// Partial update applied over an existing listing.
///
/// `None` leaves the corresponding field unchanged; there is no way to unset
/// an optional field through a patch, re-publish with full fields instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPatch {
    /// New title.
    pub title: Option<String>,
    /// New price.
    pub price: Option<Price>,
    /// New summary.
    pub summary: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New stock count.
    pub stock: Option<u32>,
    /// New listing type.
    pub listing_type: Option<ListingType>,
    /// New visibility.
    pub visibility: Option<Visibility>,
    /// Replacement image list.
    pub images: Option<Vec<ListingImage>>,
    /// Replacement spec list.
    pub specs: Option<Vec<(String, String)>>,
    /// New weight.
    pub weight: Option<Weight>,
    /// New dimensions.
    pub dimensions: Option<Dimensions>,
    /// Replacement category list.
    pub categories: Option<Vec<String>>,
}

impl ListingPatch {
    /// Merges this patch over the given fields.
    pub fn apply(self, fields: &mut ListingFields) {
        if let Some(title) = self.title {
            fields.title = title;
        }
        if let Some(price) = self.price {
            fields.price = price;
        }
        if let Some(summary) = self.summary {
            fields.summary = Some(summary);
        }
        if let Some(description) = self.description {
            fields.description = description;
        }
        if let Some(stock) = self.stock {
            fields.stock = Some(stock);
        }
        if let Some(listing_type) = self.listing_type {
            fields.listing_type = listing_type;
        }
        if let Some(visibility) = self.visibility {
            fields.visibility = visibility;
        }
        if let Some(images) = self.images {
            fields.images = images;
        }
        if let Some(specs) = self.specs {
            fields.specs = specs;
        }
        if let Some(weight) = self.weight {
            fields.weight = Some(weight);
        }
        if let Some(dimensions) = self.dimensions {
            fields.dimensions = Some(dimensions);
        }
        if let Some(categories) = self.categories {
            fields.categories = categories;
        }
    }
}

/// Builds the structured tag list for a listing record.
///
/// The first tag element is the tag name; remaining elements are positional.
/// Repeatable tags (`image`, `spec`, `category`) keep their input order.
pub fn build_tags(identity: &str, fields: &ListingFields) -> Vec<Vec<String>> {
    let mut tags: Vec<Vec<String>> = Vec::new();
    tags.push(vec!["d".into(), identity.into()]);
    tags.push(vec!["title".into(), fields.title.clone()]);

    let mut price = vec![
        "price".into(),
        fields.price.amount.clone(),
        fields.price.currency.clone(),
    ];
    if let Some(frequency) = &fields.price.frequency {
        price.push(frequency.clone());
    }
    tags.push(price);

    tags.push(vec![
        "type".into(),
        fields.listing_type.kind.as_str().into(),
        fields.listing_type.physical.as_str().into(),
    ]);
    tags.push(vec![
        "visibility".into(),
        fields.visibility.as_str().into(),
    ]);
    if let Some(stock) = fields.stock {
        tags.push(vec!["stock".into(), stock.to_string()]);
    }
    if let Some(summary) = &fields.summary {
        tags.push(vec!["summary".into(), summary.clone()]);
    }
    for image in &fields.images {
        let mut tag = vec!["image".into(), image.url.clone()];
        if image.dimensions.is_some() || image.order.is_some() {
            tag.push(image.dimensions.clone().unwrap_or_default());
        }
        if let Some(order) = image.order {
            tag.push(order.to_string());
        }
        tags.push(tag);
    }
    for (key, value) in &fields.specs {
        tags.push(vec!["spec".into(), key.clone(), value.clone()]);
    }
    if let Some(weight) = &fields.weight {
        tags.push(vec!["weight".into(), weight.value.clone(), weight.unit.clone()]);
    }
    if let Some(dimensions) = &fields.dimensions {
        tags.push(vec![
            "dimensions".into(),
            dimensions.value.clone(),
            dimensions.unit.clone(),
        ]);
    }
    for category in &fields.categories {
        tags.push(vec!["category".into(), category.clone()]);
    }
    tags
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Field the issue refers to.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

/// Validation failure for a candidate record. Recoverable: the caller may
/// retry with corrected input.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// All field-level reasons.
    pub issues: Vec<FieldIssue>,
}

impl std::error::Error for ValidationError {}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid listing: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", issue.field, issue.message)?;
        }
        Ok(())
    }
}

/// Capability to validate a candidate record before it is signed or folded
/// into the projection.
pub trait Validator: Send + Sync + 'static {
    /// Checks the draft, returning all field-level issues on failure.
    fn validate(&self, draft: &DraftRecord) -> Result<(), ValidationError>;
}

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").expect("valid regex"));
static STOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));

/// Default schema validator for catalog listing records.
///
/// Mirrors the form-level rules of the editing UI: identity, title and price
/// must be present, the price amount must be a decimal with at most two
/// fraction digits, stock must be a whole number and image URLs must parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl Validator for SchemaValidator {
    fn validate(&self, draft: &DraftRecord) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let tag_value = |name: &str| {
            draft
                .tags
                .iter()
                .find(|tag| tag.first().map(String::as_str) == Some(name))
                .and_then(|tag| tag.get(1))
        };

        if draft.kind != RecordKind::CatalogListing {
            issues.push(FieldIssue {
                field: "kind".into(),
                message: "not a catalog listing".into(),
            });
        }
        if tag_value("d").map_or(true, String::is_empty) {
            issues.push(FieldIssue {
                field: "id".into(),
                message: "identity is required".into(),
            });
        }
        if tag_value("title").map_or(true, String::is_empty) {
            issues.push(FieldIssue {
                field: "title".into(),
                message: "title is required".into(),
            });
        }
        match draft
            .tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some("price"))
        {
            None => issues.push(FieldIssue {
                field: "price".into(),
                message: "price is required".into(),
            }),
            Some(tag) => {
                match tag.get(1) {
                    Some(amount) if PRICE_RE.is_match(amount) => {}
                    _ => issues.push(FieldIssue {
                        field: "price".into(),
                        message: "amount must be a decimal number, e.g. 19.99".into(),
                    }),
                }
                if tag.get(2).map_or(true, String::is_empty) {
                    issues.push(FieldIssue {
                        field: "currency".into(),
                        message: "currency is required".into(),
                    });
                }
            }
        }
        if let Some(stock) = tag_value("stock") {
            if !STOCK_RE.is_match(stock) {
                issues.push(FieldIssue {
                    field: "stock".into(),
                    message: "stock must be a whole number".into(),
                });
            }
        }
        for (i, tag) in draft
            .tags
            .iter()
            .filter(|tag| tag.first().map(String::as_str) == Some("image"))
            .enumerate()
        {
            let ok = tag.get(1).is_some_and(|u| Url::parse(u).is_ok());
            if !ok {
                issues.push(FieldIssue {
                    field: format!("image-{i}"),
                    message: "invalid URL".into(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{Keypair, Signer};

    fn fields() -> ListingFields {
        let mut fields = ListingFields::new("Widget", Price::new("9.99", "USD"));
        fields.summary = Some("A fine widget".into());
        fields.description = "Long form widget prose".into();
        fields.stock = Some(3);
        fields.images = vec![
            ListingImage {
                url: "https://example.com/a.png".into(),
                dimensions: Some("800x600".into()),
                order: Some(0),
            },
            ListingImage {
                url: "https://example.com/b.png".into(),
                dimensions: None,
                order: None,
            },
        ];
        fields.specs = vec![("color".into(), "blue".into()), ("size".into(), "M".into())];
        fields.weight = Some(Weight {
            value: "1.5".into(),
            unit: "kg".into(),
        });
        fields.categories = vec!["tools".into(), "widgets".into()];
        fields
    }

    fn record_for(fields: &ListingFields, identity: &str, created_at: u64) -> Record {
        let draft = DraftRecord {
            kind: RecordKind::CatalogListing,
            created_at,
            tags: build_tags(identity, fields),
            content: fields.description.clone(),
        };
        Keypair::generate().sign(draft).unwrap()
    }

    #[test]
    fn decode_built_tags() {
        let fields = fields();
        let record = record_for(&fields, "widget-1", 100);
        let listing = CatalogListing::from_record(&record).unwrap();

        assert_eq!(listing.identity, "widget-1");
        assert_eq!(listing.title, "Widget");
        assert_eq!(listing.price, Price::new("9.99", "USD"));
        assert_eq!(listing.stock, Some(3));
        assert_eq!(listing.images.len(), 2);
        assert_eq!(listing.images[0].order, Some(0));
        assert_eq!(listing.specs[1], ("size".into(), "M".into()));
        assert_eq!(listing.categories, vec!["tools", "widgets"]);
        assert_eq!(listing.description, "Long form widget prose");
        assert_eq!(listing.created_at, 100);
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let fields = fields();
        let mut record = record_for(&fields, "widget-1", 100);
        record.tags.retain(|tag| tag[0] != "title");
        assert_eq!(
            CatalogListing::from_record(&record),
            Err(DecodeListingError::MissingTitle)
        );

        let mut record = record_for(&fields, "widget-1", 100);
        record.tags.retain(|tag| tag[0] != "price");
        assert_eq!(
            CatalogListing::from_record(&record),
            Err(DecodeListingError::MissingPrice)
        );

        let mut record = record_for(&fields, "widget-1", 100);
        record.tags.retain(|tag| tag[0] != "d");
        assert_eq!(
            CatalogListing::from_record(&record),
            Err(DecodeListingError::MissingIdentity)
        );
    }

    #[test]
    fn patch_merges_over_fields() {
        let mut fields = fields();
        let patch = ListingPatch {
            title: Some("Widget v2".into()),
            stock: Some(7),
            ..Default::default()
        };
        patch.apply(&mut fields);
        assert_eq!(fields.title, "Widget v2");
        assert_eq!(fields.stock, Some(7));
        // untouched fields survive
        assert_eq!(fields.price, Price::new("9.99", "USD"));
        assert_eq!(fields.categories.len(), 2);
    }

    #[test]
    fn schema_validator_flags_bad_fields() {
        let mut fields = fields();
        fields.price.amount = "nine dollars".into();
        fields.images[0].url = "not a url".into();
        let draft = DraftRecord {
            kind: RecordKind::CatalogListing,
            created_at: 100,
            tags: build_tags("widget-1", &fields),
            content: String::new(),
        };
        let err = SchemaValidator.validate(&draft).unwrap_err();
        let fields_flagged: Vec<_> = err.issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields_flagged.contains(&"price"));
        assert!(fields_flagged.contains(&"image-0"));
    }

    #[test]
    fn schema_validator_accepts_good_listing() {
        let draft = DraftRecord {
            kind: RecordKind::CatalogListing,
            created_at: 100,
            tags: build_tags("widget-1", &fields()),
            content: String::new(),
        };
        SchemaValidator.validate(&draft).unwrap();
    }
}
