//! Entity models and their table bindings.
//!
//! Property names are the camelCase field names used on the wire; each maps to
//! one storage column.

use booru_db::{Column, ColumnDef, Entity, EntitySchema};
use serde::{Deserialize, Serialize};

pub static SOURCES: EntitySchema = EntitySchema::new(
    "sources",
    &[
        Column::new("id", ColumnDef::number("source_id").primary_key()),
        Column::new("name", ColumnDef::string("source_name")),
        Column::new("enabled", ColumnDef::boolean("source_enabled")),
        Column::new("subdomain", ColumnDef::string("source_subdomain").nullable()),
    ],
);

pub static POSTS: EntitySchema = EntitySchema::new(
    "posts",
    &[
        Column::new("id", ColumnDef::number("post_id").primary_key()),
        Column::new("sourceId", ColumnDef::number("source_id")),
        Column::new("externalId", ColumnDef::string("post_external_id")),
        Column::new("dateCreated", ColumnDef::number("post_date")),
        Column::new("dateUpdated", ColumnDef::number("post_updated").nullable()),
        Column::new("title", ColumnDef::string("post_title")),
        Column::new("link", ColumnDef::string("post_link")),
        Column::new("userId", ColumnDef::number("user_id").nullable()),
        Column::new("keywords", ColumnDef::string("post_keywords")),
        Column::new("score", ColumnDef::number("post_score")),
        Column::new("visible", ColumnDef::boolean("post_visible")),
        Column::new("nsfw", ColumnDef::boolean("post_nsfw")),
    ],
);

pub static IMAGES: EntitySchema = EntitySchema::new(
    "images",
    &[
        Column::new("id", ColumnDef::number("image_id").primary_key()),
        Column::new("url", ColumnDef::string("image_url")),
        Column::new("caption", ColumnDef::string("image_caption").nullable()),
        Column::new("sourceUrl", ColumnDef::string("image_source").nullable()),
        Column::new("width", ColumnDef::number("image_width")),
        Column::new("height", ColumnDef::number("image_height")),
        Column::new("histR1", ColumnDef::number("image_hist_r1")),
        Column::new("histR2", ColumnDef::number("image_hist_r2")),
        Column::new("histR3", ColumnDef::number("image_hist_r3")),
        Column::new("histR4", ColumnDef::number("image_hist_r4")),
        Column::new("histG1", ColumnDef::number("image_hist_g1")),
        Column::new("histG2", ColumnDef::number("image_hist_g2")),
        Column::new("histG3", ColumnDef::number("image_hist_g3")),
        Column::new("histG4", ColumnDef::number("image_hist_g4")),
        Column::new("histB1", ColumnDef::number("image_hist_b1")),
        Column::new("histB2", ColumnDef::number("image_hist_b2")),
        Column::new("histB3", ColumnDef::number("image_hist_b3")),
        Column::new("histB4", ColumnDef::number("image_hist_b4")),
        Column::new("dHashR", ColumnDef::number("image_dhashr")),
        Column::new("dHashG", ColumnDef::number("image_dhashg")),
        Column::new("dHashB", ColumnDef::number("image_dhashb")),
        Column::new("type", ColumnDef::string("image_type")),
    ],
);

/// Post ↔ image link table. No primary key: links are only ever inserted.
pub static POST_IMAGES: EntitySchema = EntitySchema::new(
    "post_images",
    &[
        Column::new("postId", ColumnDef::number("post_id")),
        Column::new("imageId", ColumnDef::number("image_id")),
    ],
);

/// Denormalized read model, one row per post image, filled by
/// `proc_UpdateDenormalizedPostData`.
pub static POST_DATA: EntitySchema = EntitySchema::new(
    "post_data",
    &[
        Column::new("id", ColumnDef::number("pd_id").primary_key()),
        Column::new("imageId", ColumnDef::number("image_id")),
        Column::new("postId", ColumnDef::number("post_id")),
        Column::new("width", ColumnDef::number("image_width")),
        Column::new("height", ColumnDef::number("image_height")),
        Column::new("caption", ColumnDef::string("image_caption").nullable()),
        Column::new("sourceUrl", ColumnDef::string("image_source").nullable()),
        Column::new("type", ColumnDef::string("image_type")),
        Column::new("sourceId", ColumnDef::number("source_id")),
        Column::new("sourceName", ColumnDef::string("source_name")),
        Column::new("title", ColumnDef::string("post_title")),
        Column::new("keywords", ColumnDef::string("post_keywords")),
        Column::new("nsfw", ColumnDef::boolean("post_nsfw")),
        Column::new("dateCreated", ColumnDef::number("post_date")),
        Column::new("externalId", ColumnDef::string("post_external_id")),
        Column::new("score", ColumnDef::number("post_score")),
        Column::new("visible", ColumnDef::boolean("post_visible")),
        Column::new("userId", ColumnDef::number("user_id").nullable()),
        Column::new("userName", ColumnDef::string("user_name").nullable()),
    ],
);

/// Every schema this module reads or writes.
pub static ALL_SCHEMAS: [&EntitySchema; 5] = [&SOURCES, &POSTS, &IMAGES, &POST_IMAGES, &POST_DATA];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub subdomain: Option<String>,
}

impl Entity for Source {
    fn schema() -> &'static EntitySchema {
        &SOURCES
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub source_id: u64,
    pub external_id: String,
    /// Unix seconds.
    pub date_created: i64,
    #[serde(default)]
    pub date_updated: Option<i64>,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub user_id: Option<u64>,
    pub keywords: String,
    pub score: i64,
    pub visible: bool,
    pub nsfw: bool,
}

impl Entity for Post {
    fn schema() -> &'static EntitySchema {
        &POSTS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageType {
    #[serde(rename = "png")]
    Png,
    #[serde(rename = "jpg")]
    Jpeg,
    #[serde(rename = "gif")]
    Gif,
}

/// An image with its colour histogram (four buckets per channel) and
/// per-channel difference hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub hist_r1: f64,
    pub hist_r2: f64,
    pub hist_r3: f64,
    pub hist_r4: f64,
    pub hist_g1: f64,
    pub hist_g2: f64,
    pub hist_g3: f64,
    pub hist_g4: f64,
    pub hist_b1: f64,
    pub hist_b2: f64,
    pub hist_b3: f64,
    pub hist_b4: f64,
    #[serde(rename = "dHashR")]
    pub dhash_r: u64,
    #[serde(rename = "dHashG")]
    pub dhash_g: u64,
    #[serde(rename = "dHashB")]
    pub dhash_b: u64,
    #[serde(rename = "type")]
    pub kind: ImageType,
}

impl Entity for Image {
    fn schema() -> &'static EntitySchema {
        &IMAGES
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostImage {
    pub post_id: u64,
    pub image_id: u64,
}

impl Entity for PostImage {
    fn schema() -> &'static EntitySchema {
        &POST_IMAGES
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    pub id: u64,
    pub image_id: u64,
    pub post_id: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: ImageType,
    pub source_id: u64,
    pub source_name: String,
    pub title: String,
    pub keywords: String,
    pub nsfw: bool,
    pub date_created: i64,
    pub external_id: String,
    pub score: i64,
    pub visible: bool,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl Entity for PostData {
    fn schema() -> &'static EntitySchema {
        &POST_DATA
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use booru_db::Row;
    use booru_db::mapper;
    use serde_json::json;

    fn image_json() -> serde_json::Value {
        json!({
            "url": "https://cdn.example/1.png",
            "width": 800, "height": "600",
            "histR1": 0.1, "histR2": 0.2, "histR3": 0.3, "histR4": 0.4,
            "histG1": 0.1, "histG2": 0.2, "histG3": 0.3, "histG4": 0.4,
            "histB1": 0.1, "histB2": 0.2, "histB3": 0.3, "histB4": 0.4,
            "dHashR": 1, "dHashG": 2, "dHashB": 3,
            "type": "png"
        })
    }

    #[test]
    fn schemas_are_valid() {
        booru_db::schema::verify_all(ALL_SCHEMAS).unwrap();
        for schema in [&SOURCES, &POSTS, &IMAGES, &POST_DATA] {
            schema.verify(true).unwrap();
        }
        assert!(POST_IMAGES.primary_key().is_none());
    }

    #[test]
    fn serialized_properties_match_schema() {
        let image = Image::create(&image_json()).unwrap();
        let record = image.to_record().unwrap();
        for (property, _) in record.iter() {
            assert!(IMAGES.column(property).is_some(), "{property} is not mapped");
        }
        assert_eq!(image.height, 600);
        assert_eq!(image.kind, ImageType::Png);
    }

    #[test]
    fn unknown_image_type_is_rejected() {
        let mut raw = image_json();
        raw["type"] = json!("bmp");
        let errors = Image::create(&raw).unwrap_err();
        assert_eq!(errors.iter().next().map(|e| e.property.as_str()), Some("$"));
    }

    #[test]
    fn source_from_storage_row() {
        let row = Row::new()
            .with("source_id", 3)
            .with("source_name", "gelbooru")
            .with("source_enabled", true)
            .with("source_subdomain", serde_json::Value::Null);
        let source = Source::from_record(mapper::from_row(&SOURCES, &row)).unwrap();
        assert_eq!(
            source,
            Source {
                id: Some(3),
                name: "gelbooru".into(),
                enabled: true,
                subdomain: None,
            }
        );
    }
}
