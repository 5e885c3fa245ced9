use rust_decimal::Decimal;

use super::{Reader, ReaderError, Serializer, Writer};

macro_rules! impl_int_serializer {
    ($t: ty, $read: ident, $write: ident, $size: expr) => {
        impl Serializer for $t {
            fn write(&self, writer: &mut Writer) {
                writer.$write(*self);
            }

            fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
                reader.$read()
            }

            fn size(&self) -> usize {
                $size
            }
        }
    };
}

impl_int_serializer!(u8, read_u8, write_u8, 1);
impl_int_serializer!(u16, read_u16, write_u16, 2);
impl_int_serializer!(u32, read_u32, write_u32, 4);
impl_int_serializer!(u64, read_u64, write_u64, 8);
impl_int_serializer!(u128, read_u128, write_u128, 16);
impl_int_serializer!(bool, read_bool, write_bool, 1);

impl Serializer for String {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_string()
    }

    fn size(&self) -> usize {
        2 + self.len()
    }
}

impl<T: Serializer> Serializer for Option<T> {
    fn write(&self, writer: &mut Writer) {
        match self {
            Some(value) => {
                writer.write_bool(true);
                value.write(writer);
            }
            None => writer.write_bool(false),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        if reader.read_bool()? {
            Ok(Some(T::read(reader)?))
        } else {
            Ok(None)
        }
    }

    fn size(&self) -> usize {
        1 + self.as_ref().map(Serializer::size).unwrap_or(0)
    }
}

impl<T: Serializer> Serializer for Vec<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.len() as u32);
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let count = reader.read_u32()? as usize;
        // Every element takes at least one byte
        if count > reader.size() {
            return Err(ReaderError::InvalidSize);
        }

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }

    fn size(&self) -> usize {
        4 + self.iter().map(Serializer::size).sum::<usize>()
    }
}

// Decimals keep their exact scale through the 16 byte representation
impl Serializer for Decimal {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.serialize());
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Decimal::deserialize(reader.read_bytes::<16>()?))
    }

    fn size(&self) -> usize {
        16
    }
}

impl Serializer for () {
    fn write(&self, _: &mut Writer) {}

    fn read(_: &mut Reader) -> Result<Self, ReaderError> {
        Ok(())
    }

    fn size(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        assert_eq!(1u64.to_bytes(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(258u16.to_bytes(), vec![1, 2]);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = 7u32.to_bytes();
        bytes.push(0);
        assert_eq!(u32::from_bytes(&bytes), Err(ReaderError::InvalidSize));
    }

    #[test]
    fn test_decimal_keeps_scale() {
        let price = Decimal::new(12345, 4);
        let decoded = Decimal::from_bytes(&price.to_bytes()).unwrap();
        assert_eq!(decoded, price);
        assert_eq!(decoded.scale(), 4);
    }

    #[test]
    fn test_vec_count_larger_than_input() {
        let mut bytes = Vec::new();
        let mut writer = Writer::new(&mut bytes);
        writer.write_u32(1000);
        assert!(Vec::<u64>::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_option_and_string() {
        let value = Some("settlement-0x01".to_string());
        let bytes = value.to_bytes();
        assert_eq!(bytes.len(), value.size());
        assert_eq!(Option::<String>::from_bytes(&bytes).unwrap(), value);
        assert_eq!(Option::<String>::from_bytes(&[0]).unwrap(), None);
    }
}
