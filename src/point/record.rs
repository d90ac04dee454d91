use crate::errors::{PointError, Result};
use crate::store::{record_size, FieldDef};
use crate::types::{is_compatible, NumberType, PointType};

/// Packs typed values into the record layout of a level.
///
/// Values are pushed field by field, in field order; a record is complete
/// once its last field has been pushed.
///
/// ```
/// use eos_point::{FieldDef, NumberType, RecordBuilder};
///
/// let fields = [
///     FieldDef::new("Code", NumberType::Char8, 4),
///     FieldDef::scalar("Depth", NumberType::Float32),
/// ];
/// let mut builder = RecordBuilder::new(&fields);
/// builder.text("A1").unwrap().push(&[12.5f32]).unwrap();
/// builder.text("B2").unwrap().push(&[40.0f32]).unwrap();
/// assert_eq!(builder.records(), 2);
/// assert_eq!(builder.into_bytes().unwrap().len(), 16);
/// ```
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    fields: &'a [FieldDef],
    data: Vec<u8>,
    next: usize,
    records: usize,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(fields: &'a [FieldDef]) -> Self {
        RecordBuilder {
            fields,
            data: Vec::new(),
            next: 0,
            records: 0,
        }
    }

    fn current(&self) -> Result<&'a FieldDef> {
        self.fields.get(self.next).ok_or_else(|| {
            PointError::BadArgument("record layout has no fields".to_string())
        })
    }

    fn advance(&mut self) {
        self.next += 1;
        if self.next == self.fields.len() {
            self.next = 0;
            self.records += 1;
        }
    }

    /// Pushes the values of the next field; exactly `order` of them.
    pub fn push<T: PointType>(&mut self, values: &[T]) -> Result<&mut Self> {
        let field = self.current()?;
        if !is_compatible::<T>(field.number_type) {
            return Err(PointError::BadArgument(format!(
                "field \"{}\" holds {}, got {}",
                field.name,
                field.number_type,
                T::number_type()
            )));
        }
        if values.len() != field.order {
            return Err(PointError::BadArgument(format!(
                "field \"{}\" takes {} values, got {}",
                field.name,
                field.order,
                values.len()
            )));
        }
        for v in values {
            v.write_le(&mut self.data);
        }
        self.advance();
        Ok(self)
    }

    /// Pushes text into the next field, which must be a character field.
    /// The text is zero padded to the field order.
    pub fn text(&mut self, text: &str) -> Result<&mut Self> {
        let field = self.current()?;
        if !matches!(field.number_type, NumberType::Char8 | NumberType::UChar8) {
            return Err(PointError::BadArgument(format!(
                "field \"{}\" holds {}, not characters",
                field.name, field.number_type
            )));
        }
        let bytes = text.as_bytes();
        if bytes.len() > field.order {
            return Err(PointError::BadArgument(format!(
                "\"{text}\" is longer than the {} characters of \"{}\"",
                field.order, field.name
            )));
        }
        self.data.extend_from_slice(bytes);
        self.data
            .resize(self.data.len() + field.order - bytes.len(), 0);
        self.advance();
        Ok(self)
    }

    /// Completed records so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// The packed records. Fails if the last record is incomplete.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if self.next != 0 {
            return Err(PointError::BadArgument(format!(
                "incomplete record: next field is \"{}\"",
                self.fields[self.next].name
            )));
        }
        Ok(self.data)
    }
}

/// Decodes records read from a level.
///
/// `fields` must describe the bytes exactly, e.g. the result of
/// [`PointFile::level_fields`](crate::PointFile::level_fields) for the
/// field list that was read.
#[derive(Debug)]
pub struct RecordReader<'a> {
    fields: &'a [FieldDef],
    offsets: Vec<usize>,
    record_size: usize,
    data: &'a [u8],
}

impl<'a> RecordReader<'a> {
    pub fn new(fields: &'a [FieldDef], data: &'a [u8]) -> Result<Self> {
        let size = record_size(fields);
        if size == 0 || data.len() % size != 0 {
            return Err(PointError::BadArgument(format!(
                "{} bytes is not a whole number of {size}-byte records",
                data.len()
            )));
        }
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for f in fields {
            offsets.push(offset);
            offset += f.size();
        }
        Ok(RecordReader {
            fields,
            offsets,
            record_size: size,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.record_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn locate(&self, record: usize, name: &str) -> Result<(&'a FieldDef, &'a [u8])> {
        let count = self.len();
        if record >= count {
            return Err(PointError::RecordOutOfRange {
                level: 0,
                record,
                count,
            });
        }
        let i = self
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| PointError::FieldNotFound {
                field: name.to_string(),
                level: None,
            })?;
        let field = &self.fields[i];
        let at = record * self.record_size + self.offsets[i];
        Ok((field, &self.data[at..at + field.size()]))
    }

    /// All `order` values of a field in one record.
    pub fn values<T: PointType>(&self, record: usize, name: &str) -> Result<Vec<T>> {
        let (field, bytes) = self.locate(record, name)?;
        crate::types::check_type::<T>(name, field.number_type)?;
        Ok(bytes
            .chunks_exact(field.number_type.size())
            .map(T::read_le)
            .collect())
    }

    /// The first value of a field in one record.
    pub fn value<T: PointType>(&self, record: usize, name: &str) -> Result<T> {
        let (field, bytes) = self.locate(record, name)?;
        crate::types::check_type::<T>(name, field.number_type)?;
        Ok(T::read_le(bytes))
    }

    /// A character field with trailing zero bytes removed.
    pub fn text(&self, record: usize, name: &str) -> Result<String> {
        let (_, bytes) = self.locate(record, name)?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}
