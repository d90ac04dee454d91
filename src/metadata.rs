//! Structural metadata.
//!
//! Every point structure is described in a self-describing ODL text block
//! (`GROUP=`/`OBJECT=` nesting) kept alongside the tables. The block is
//! regenerated from the store after each definition call and is never read
//! back by this crate.

use std::fmt::{Display, Formatter, Write};

use crate::store::FieldDef;

/// Declared link between two adjacent levels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkEntry {
    pub parent: String,
    pub child: String,
    pub link_field: String,
}

/// A level and its fields, in definition order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelEntry {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

/// Description of one point structure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointEntry {
    pub name: String,
    pub levels: Vec<LevelEntry>,
    pub links: Vec<LinkEntry>,
}

/// All point structures of a file, in creation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructMetadata {
    pub points: Vec<PointEntry>,
}

impl PointEntry {
    fn write_odl(&self, number: usize, out: &mut String) -> std::fmt::Result {
        writeln!(out, "\tGROUP=POINT_{number}")?;
        writeln!(out, "\t\tPointName=\"{}\"", self.name)?;

        writeln!(out, "\t\tGROUP=Level")?;
        for (k, level) in self.levels.iter().enumerate() {
            writeln!(out, "\t\t\tGROUP=Level_{k}")?;
            writeln!(out, "\t\t\t\tLevelName=\"{}\"", level.name)?;
            for (i, field) in level.fields.iter().enumerate() {
                let i = i + 1;
                writeln!(out, "\t\t\t\tOBJECT=PointField_{i}")?;
                writeln!(out, "\t\t\t\t\tPointFieldName=\"{}\"", field.name)?;
                writeln!(out, "\t\t\t\t\tDataType={}", field.number_type.name())?;
                writeln!(out, "\t\t\t\t\tOrder={}", field.order)?;
                writeln!(out, "\t\t\t\tEND_OBJECT=PointField_{i}")?;
            }
            writeln!(out, "\t\t\tEND_GROUP=Level_{k}")?;
        }
        writeln!(out, "\t\tEND_GROUP=Level")?;

        writeln!(out, "\t\tGROUP=LevelLink")?;
        for (i, link) in self.links.iter().enumerate() {
            let i = i + 1;
            writeln!(out, "\t\t\tOBJECT=LevelLink_{i}")?;
            writeln!(out, "\t\t\t\tParent=\"{}\"", link.parent)?;
            writeln!(out, "\t\t\t\tChild=\"{}\"", link.child)?;
            writeln!(out, "\t\t\t\tLinkField=\"{}\"", link.link_field)?;
            writeln!(out, "\t\t\tEND_OBJECT=LevelLink_{i}")?;
        }
        writeln!(out, "\t\tEND_GROUP=LevelLink")?;

        writeln!(out, "\tEND_GROUP=POINT_{number}")
    }
}

impl Display for StructMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        out.push_str("GROUP=PointStructure\n");
        for (i, point) in self.points.iter().enumerate() {
            point.write_odl(i + 1, &mut out)?;
        }
        out.push_str("END_GROUP=PointStructure\n");
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NumberType;

    #[test]
    fn test_render_point_block() {
        let md = StructMetadata {
            points: vec![PointEntry {
                name: "Stations".to_string(),
                levels: vec![
                    LevelEntry {
                        name: "Site".to_string(),
                        fields: vec![FieldDef::new("ID", NumberType::Char8, 8)],
                    },
                    LevelEntry {
                        name: "Obs".to_string(),
                        fields: vec![
                            FieldDef::scalar("ID", NumberType::Char8),
                            FieldDef::scalar("Time", NumberType::Float64),
                        ],
                    },
                ],
                links: vec![LinkEntry {
                    parent: "Site".to_string(),
                    child: "Obs".to_string(),
                    link_field: "ID".to_string(),
                }],
            }],
        };
        let text = md.to_string();
        assert!(text.starts_with("GROUP=PointStructure\n\tGROUP=POINT_1\n\t\tPointName=\"Stations\"\n"));
        assert!(text.contains(
            "\t\t\t\tOBJECT=PointField_2\n\t\t\t\t\tPointFieldName=\"Time\"\n\t\t\t\t\tDataType=DFNT_FLOAT64\n\t\t\t\t\tOrder=1\n"
        ));
        assert!(text.contains("\t\t\tGROUP=Level_1\n\t\t\t\tLevelName=\"Obs\"\n"));
        assert!(text.contains("\t\t\t\tLinkField=\"ID\"\n\t\t\tEND_OBJECT=LevelLink_1\n"));
        assert!(text.ends_with("\tEND_GROUP=POINT_1\nEND_GROUP=PointStructure\n"));
    }

    #[test]
    fn test_empty() {
        assert_eq!(
            StructMetadata::default().to_string(),
            "GROUP=PointStructure\nEND_GROUP=PointStructure\n"
        );
    }
}
