//! FlatGeobuf file generator for tests and benchmarks.
//!
//! [`FgbFileBuilder`] lays out a complete version 3 file: magic bytes, the
//! size-prefixed header, an optional packed Hilbert R-Tree and the
//! size-prefixed features. Tables are written with the builders generated
//! in the `flatgeobuf` crate and the index with its `PackedRTree`. Unlike
//! `flatgeobuf::FgbWriter` it can pick any node size and write broken
//! property blocks. It only exists to produce inputs for the reader and
//! panics on inconsistent input instead of reporting errors.

use flatbuffers::{FlatBufferBuilder, WIPOffset};
use flatgeobuf::packed_r_tree::{calc_extent, hilbert_sort, NodeItem, PackedRTree};
use flatgeobuf::{
    Column, ColumnArgs, Crs, CrsArgs, Feature, FeatureArgs, GeometryArgs, Header, HeaderArgs,
};
use std::fs;
use std::io;
use std::path::Path;

use crate::bounding_box::BoundingBox;
use crate::geometry::{Coordinate, Geometry, GeometryType};
use crate::header::*;
use crate::value::{ColumnType, RowValue};

/// One feature to write.
#[derive(Debug, Clone, Default)]
pub struct FixtureFeature {
    geometry: Option<Geometry>,
    empty_geometry: bool,
    properties: Vec<(u16, RowValue)>,
    raw_properties: Option<Vec<u8>>,
}

impl FixtureFeature {
    pub fn new(geometry: Option<Geometry>) -> Self {
        Self {
            geometry,
            ..Self::default()
        }
    }

    /// A feature whose geometry table is present but holds no coordinates.
    pub fn with_empty_geometry() -> Self {
        Self {
            empty_geometry: true,
            ..Self::default()
        }
    }

    /// Adds a property value, encoded according to the column's type.
    pub fn property(mut self, column: u16, value: RowValue) -> Self {
        self.properties.push((column, value));
        self
    }

    /// Replaces the property block with `bytes` as is.
    pub fn raw_properties(mut self, bytes: Vec<u8>) -> Self {
        self.raw_properties = Some(bytes);
        self
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.geometry
            .as_ref()
            .map(Geometry::bounding_box)
            .unwrap_or_else(BoundingBox::empty)
    }
}

/// Builds FlatGeobuf file images.
///
/// Defaults: no spatial index, mixed geometry type, srid 0, features kept
/// in insertion order.
#[derive(Debug, Clone, Default)]
pub struct FgbFileBuilder {
    name: Option<String>,
    title: Option<String>,
    description: Option<String>,
    metadata: Option<String>,
    geometry_type: GeometryType,
    srid: i32,
    columns: Vec<(ColumnDescriptor, u8)>,
    features: Vec<FixtureFeature>,
    index_node_size: u16,
    hilbert_sort: bool,
}

impl FgbFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn geometry_type(mut self, geometry_type: GeometryType) -> Self {
        self.geometry_type = geometry_type;
        self
    }

    pub fn srid(mut self, srid: i32) -> Self {
        self.srid = srid;
        self
    }

    /// # Panics
    /// If the descriptor has no column type; use [`Self::column_with_tag`].
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        let tag = match column.column_type {
            Some(column_type) => column_type.tag(),
            None => panic!("column '{}' needs a type", column.name),
        };
        self.columns.push((column, tag));
        self
    }

    /// Adds a column stored with an arbitrary type tag.
    pub fn column_with_tag(mut self, name: impl Into<String>, tag: u8) -> Self {
        let mut column = ColumnDescriptor::new(name, ColumnType::Binary);
        column.column_type = ColumnType::from_tag(tag);
        self.columns.push((column, tag));
        self
    }

    pub fn feature(mut self, feature: FixtureFeature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn features(mut self, features: impl IntoIterator<Item = FixtureFeature>) -> Self {
        self.features.extend(features);
        self
    }

    /// Node size of the packed index; 0 writes no index.
    pub fn index_node_size(mut self, node_size: u16) -> Self {
        self.index_node_size = node_size;
        self
    }

    /// Stores features in Hilbert order of their bounding boxes, the way
    /// FlatGeobuf writers do before building the index.
    pub fn hilbert_sort(mut self, enabled: bool) -> Self {
        self.hilbert_sort = enabled;
        self
    }

    /// Features in the order they will be stored.
    pub fn ordered_features(&self) -> Vec<FixtureFeature> {
        if !self.hilbert_sort {
            return self.features.clone();
        }
        // sort on node items carrying the feature position as offset
        let mut items: Vec<NodeItem> = self
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| node_item(&f.bounding_box(), i as u64))
            .collect();
        let extent = calc_extent(&items);
        hilbert_sort(&mut items, &extent);
        items
            .iter()
            .map(|item| self.features[item.offset as usize].clone())
            .collect()
    }

    pub fn build_bytes(&self) -> Vec<u8> {
        let features = self.ordered_features();

        let mut records = Vec::with_capacity(features.len());
        let mut leaves = Vec::with_capacity(features.len());
        let mut envelope = BoundingBox::empty();
        let mut offset = 0u64;
        for feature in &features {
            let record = self.encode_feature(feature);
            let bbox = feature.bounding_box();
            if bbox.is_valid() {
                envelope.expand(&bbox);
            }
            leaves.push(node_item(&bbox, offset));
            offset += record.len() as u64;
            records.push(record);
        }

        let mut out = MAGIC_BYTES.to_vec();
        out.extend(self.encode_header(&envelope, features.len() as u64));
        if self.index_node_size > 0 && !leaves.is_empty() {
            let tree = PackedRTree::build(&leaves, &calc_extent(&leaves), self.index_node_size)
                .expect("packed index over fixture features");
            tree.stream_write(&mut out).expect("writing to a Vec");
        }
        for record in records {
            out.extend(record);
        }
        out
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.build_bytes())
    }

    /// Size-prefixed header table.
    fn encode_header(&self, envelope: &BoundingBox, feature_count: u64) -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::new();
        let columns: Vec<_> = self
            .columns
            .iter()
            .map(|(column, tag)| encode_column(&mut fbb, column, *tag))
            .collect();
        let columns = fbb.create_vector(&columns);
        let envelope = envelope.is_valid().then(|| {
            fbb.create_vector(&[envelope.min_x, envelope.min_y, envelope.max_x, envelope.max_y])
        });
        let crs = (self.srid != 0).then(|| {
            Crs::create(
                &mut fbb,
                &CrsArgs {
                    code: self.srid,
                    ..Default::default()
                },
            )
        });
        let name = self.name.as_deref().map(|text| fbb.create_string(text));
        let title = self.title.as_deref().map(|text| fbb.create_string(text));
        let description = self.description.as_deref().map(|text| fbb.create_string(text));
        let metadata = self.metadata.as_deref().map(|text| fbb.create_string(text));

        let header = Header::create(
            &mut fbb,
            &HeaderArgs {
                name,
                envelope,
                geometry_type: self.geometry_type.into(),
                columns: Some(columns),
                features_count: feature_count,
                index_node_size: self.index_node_size,
                crs,
                title,
                description,
                metadata,
                ..Default::default()
            },
        );
        fbb.finish_size_prefixed(header, None);
        fbb.finished_data().to_vec()
    }

    /// Size-prefixed feature table.
    fn encode_feature(&self, feature: &FixtureFeature) -> Vec<u8> {
        let properties = match &feature.raw_properties {
            Some(raw) => raw.clone(),
            None => self.encode_properties(&feature.properties),
        };
        let mut fbb = FlatBufferBuilder::new();
        let geometry = match &feature.geometry {
            Some(geometry) => Some(build_geometry(&mut fbb, geometry)),
            None if feature.empty_geometry => Some(flatgeobuf::Geometry::create(
                &mut fbb,
                &GeometryArgs {
                    type_: self.geometry_type.into(),
                    ..Default::default()
                },
            )),
            None => None,
        };
        let properties = fbb.create_vector(&properties);
        let root = Feature::create(
            &mut fbb,
            &FeatureArgs {
                geometry,
                properties: Some(properties),
                ..Default::default()
            },
        );
        fbb.finish_size_prefixed(root, None);
        fbb.finished_data().to_vec()
    }

    fn encode_properties(&self, properties: &[(u16, RowValue)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (column, value) in properties {
            let column_type = self
                .columns
                .get(*column as usize)
                .and_then(|(descriptor, _)| descriptor.column_type)
                .unwrap_or_else(|| panic!("no typed column {}", column));
            out.extend_from_slice(&column.to_le_bytes());
            encode_value(column_type, value, &mut out);
        }
        out
    }
}

fn node_item(bbox: &BoundingBox, offset: u64) -> NodeItem {
    NodeItem {
        min_x: bbox.min_x,
        min_y: bbox.min_y,
        max_x: bbox.max_x,
        max_y: bbox.max_y,
        offset,
    }
}

fn encode_column<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    column: &ColumnDescriptor,
    tag: u8,
) -> WIPOffset<Column<'a>> {
    let name = fbb.create_string(&column.name);
    let title = column.title.as_deref().map(|text| fbb.create_string(text));
    let description = column.description.as_deref().map(|text| fbb.create_string(text));
    Column::create(
        fbb,
        &ColumnArgs {
            name: Some(name),
            type_: flatgeobuf::ColumnType(tag),
            title,
            description,
            width: column.width,
            precision: column.precision,
            scale: column.scale,
            nullable: column.nullable,
            ..Default::default()
        },
    )
}

fn push_prefixed(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn encode_value(column_type: ColumnType, value: &RowValue, out: &mut Vec<u8>) {
    match (column_type, value) {
        (ColumnType::Byte, RowValue::SmallInt(v)) => out.push(*v as i8 as u8),
        (ColumnType::UByte, RowValue::SmallInt(v)) => out.push(*v as u8),
        (ColumnType::Bool, RowValue::Bool(v)) => out.push(*v as u8),
        (ColumnType::Short, RowValue::SmallInt(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::UShort, RowValue::Int(v)) => out.extend_from_slice(&(*v as u16).to_le_bytes()),
        (ColumnType::Int, RowValue::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::UInt, RowValue::BigInt(v)) => out.extend_from_slice(&(*v as u32).to_le_bytes()),
        (ColumnType::Long, RowValue::BigInt(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::ULong, RowValue::UnsignedBigInt(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::Float, RowValue::Real(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::Double, RowValue::Double(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::String, RowValue::Varchar(v)) => push_prefixed(v.as_bytes(), out),
        (ColumnType::Json, RowValue::Json(v)) => push_prefixed(v.as_bytes(), out),
        (ColumnType::DateTime, RowValue::Date(v)) => {
            push_prefixed(v.format("%Y-%m-%d").to_string().as_bytes(), out)
        }
        // raw date literals, valid or not
        (ColumnType::DateTime, RowValue::Varchar(v)) => push_prefixed(v.as_bytes(), out),
        (ColumnType::Binary, RowValue::Binary(v)) => push_prefixed(v, out),
        (column_type, value) => panic!("cannot encode {:?} as {}", value, column_type),
    }
}

fn ring_ends(rings: &[Vec<Coordinate>]) -> Option<Vec<u32>> {
    if rings.len() < 2 {
        return None;
    }
    let mut end = 0u32;
    Some(
        rings
            .iter()
            .map(|ring| {
                end += ring.len() as u32;
                end
            })
            .collect(),
    )
}

/// Coordinates of one geometry table, Z and M only when every coordinate
/// has them.
fn build_coordinates<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    geometry_type: GeometryType,
    coords: &[Coordinate],
    ends: Option<Vec<u32>>,
) -> WIPOffset<flatgeobuf::Geometry<'a>> {
    let xy: Vec<f64> = coords.iter().flat_map(|c| [c.x, c.y]).collect();
    let z: Option<Vec<f64>> = coords.iter().map(|c| c.z).collect();
    let m: Option<Vec<f64>> = coords.iter().map(|c| c.m).collect();

    let xy = fbb.create_vector(&xy);
    let z = z.filter(|z| !z.is_empty()).map(|z| fbb.create_vector(&z));
    let m = m.filter(|m| !m.is_empty()).map(|m| fbb.create_vector(&m));
    let ends = ends.map(|ends| fbb.create_vector(&ends));
    flatgeobuf::Geometry::create(
        fbb,
        &GeometryArgs {
            ends,
            xy: Some(xy),
            z,
            m,
            type_: geometry_type.into(),
            ..Default::default()
        },
    )
}

fn build_parts<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    geometry_type: GeometryType,
    parts: &[Geometry],
) -> WIPOffset<flatgeobuf::Geometry<'a>> {
    let parts: Vec<_> = parts.iter().map(|part| build_geometry(&mut *fbb, part)).collect();
    let parts = fbb.create_vector(&parts);
    flatgeobuf::Geometry::create(
        fbb,
        &GeometryArgs {
            type_: geometry_type.into(),
            parts: Some(parts),
            ..Default::default()
        },
    )
}

/// Writes `geometry` as a FlatGeobuf geometry table.
fn build_geometry<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    geometry: &Geometry,
) -> WIPOffset<flatgeobuf::Geometry<'a>> {
    let geometry_type = geometry.geometry_type();
    match geometry {
        Geometry::Point(c) => build_coordinates(fbb, geometry_type, std::slice::from_ref(c), None),
        Geometry::LineString(cs) | Geometry::MultiPoint(cs) => {
            build_coordinates(fbb, geometry_type, cs, None)
        }
        Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
            let flat: Vec<Coordinate> = rings.iter().flatten().copied().collect();
            build_coordinates(fbb, geometry_type, &flat, ring_ends(rings))
        }
        Geometry::MultiPolygon(polygons) => {
            let parts: Vec<Geometry> = polygons.iter().cloned().map(Geometry::Polygon).collect();
            build_parts(fbb, geometry_type, &parts)
        }
        Geometry::GeometryCollection(members) => build_parts(fbb, geometry_type, members),
    }
}
