//! Minimal JVM class-file reader.
//!
//! Decodes exactly enough of the format to compare two versions of a
//! class structurally: the constant pool (enough to resolve class and
//! UTF8 names), the this/super/interfaces table, and the field and
//! method tables. `Code` attribute bytes are captured as an opaque blob
//! for digesting, never interpreted — this parser has no notion of JVM
//! instructions.

use std::io::{Cursor, Read};

use thiserror::Error;

const CLASS_MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not a class file: bad magic")]
    BadMagic,
    #[error("unexpected end of class file while reading {0}")]
    Truncated(&'static str),
    #[error("constant pool index {0} out of range")]
    BadConstantPoolIndex(u16),
    #[error("constant pool index {0} did not resolve to a UTF8 entry")]
    NotUtf8(u16),
}

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldSignature {
    pub name: String,
    pub descriptor: String,
}

/// Whether a field's `ACC_FINAL` bit was set, tracked separately from
/// [`FieldSignature`]'s identity (name + descriptor) so an access-flag
/// change alone is never mistaken for a field add/remove by the
/// validator's set-difference comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMutability {
    pub is_final: bool,
}

#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: String,
    pub descriptor: String,
    /// Raw bytes of the method's `Code` attribute, if it has one
    /// (abstract/native methods don't).
    pub code_attribute: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldSignature>,
    /// Positionally aligned with `fields`.
    pub field_mutability: Vec<FieldMutability>,
    pub methods: Vec<MethodSignature>,
}

enum ConstantPoolEntry {
    Utf8(String),
    Class { name_index: u16 },
    /// Any other tag: stored only so indices stay aligned; these entries
    /// are never resolved to a name by this parser.
    Other,
    /// The padding slot following a Long/Double entry, which occupies
    /// two constant pool indices per the class file format.
    Padding,
}

struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn u1(&mut self, ctx: &'static str) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.cursor.read_exact(&mut buf).map_err(|_| ParseError::Truncated(ctx))?;
        Ok(buf[0])
    }

    fn u2(&mut self, ctx: &'static str) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.cursor.read_exact(&mut buf).map_err(|_| ParseError::Truncated(ctx))?;
        Ok(u16::from_be_bytes(buf))
    }

    fn u4(&mut self, ctx: &'static str) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.cursor.read_exact(&mut buf).map_err(|_| ParseError::Truncated(ctx))?;
        Ok(u32::from_be_bytes(buf))
    }

    fn bytes(&mut self, len: usize, ctx: &'static str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| ParseError::Truncated(ctx))?;
        Ok(buf)
    }

    fn skip(&mut self, len: usize, ctx: &'static str) -> Result<()> {
        self.bytes(len, ctx).map(|_| ())
    }
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);

        let magic = r.u4("magic")?;
        if magic != CLASS_MAGIC {
            return Err(ParseError::BadMagic);
        }
        let _minor = r.u2("minor version")?;
        let _major = r.u2("major version")?;

        let pool = read_constant_pool(&mut r)?;

        let access_flags = r.u2("access flags")?;
        let this_class_idx = r.u2("this_class")?;
        let super_class_idx = r.u2("super_class")?;

        let this_class = resolve_class_name(&pool, this_class_idx)?;
        let super_class = if super_class_idx == 0 {
            None
        } else {
            Some(resolve_class_name(&pool, super_class_idx)?)
        };

        let interfaces_count = r.u2("interfaces_count")?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            let idx = r.u2("interface index")?;
            interfaces.push(resolve_class_name(&pool, idx)?);
        }

        const ACC_FINAL: u16 = 0x0010;

        let fields_count = r.u2("fields_count")?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        let mut field_mutability = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            let access_flags = r.u2("field access_flags")?;
            let name_index = r.u2("field name_index")?;
            let descriptor_index = r.u2("field descriptor_index")?;
            skip_attributes(&mut r)?;
            fields.push(FieldSignature {
                name: resolve_utf8(&pool, name_index)?,
                descriptor: resolve_utf8(&pool, descriptor_index)?,
            });
            field_mutability.push(FieldMutability {
                is_final: access_flags & ACC_FINAL != 0,
            });
        }

        let methods_count = r.u2("methods_count")?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            let _access_flags = r.u2("method access_flags")?;
            let name_index = r.u2("method name_index")?;
            let descriptor_index = r.u2("method descriptor_index")?;
            let code_attribute = read_method_attributes(&mut r)?;
            methods.push(MethodSignature {
                name: resolve_utf8(&pool, name_index)?,
                descriptor: resolve_utf8(&pool, descriptor_index)?,
                code_attribute,
            });
        }

        // Class-level attributes: read and discard, we don't compare them.
        skip_attributes(&mut r)?;

        Ok(ClassFile {
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            field_mutability,
            methods,
        })
    }
}

fn read_constant_pool(r: &mut Reader) -> Result<Vec<ConstantPoolEntry>> {
    let count = r.u2("constant_pool_count")?;
    // Index 0 is unused; the pool is 1-indexed up to count - 1.
    let mut pool = Vec::with_capacity(count as usize);
    pool.push(ConstantPoolEntry::Other);

    let mut i = 1u16;
    while i < count {
        let tag = r.u1("constant pool tag")?;
        match tag {
            1 => {
                // CONSTANT_Utf8
                let len = r.u2("utf8 length")?;
                let bytes = r.bytes(len as usize, "utf8 bytes")?;
                let s = String::from_utf8_lossy(&bytes).into_owned();
                pool.push(ConstantPoolEntry::Utf8(s));
            }
            7 => {
                // CONSTANT_Class
                let name_index = r.u2("class name_index")?;
                pool.push(ConstantPoolEntry::Class { name_index });
            }
            8 | 16 | 19 | 20 => {
                // String, MethodType, Module, Package: one u2 operand.
                r.skip(2, "constant pool operand")?;
                pool.push(ConstantPoolEntry::Other);
            }
            3 | 4 => {
                // Integer, Float: one u4 operand.
                r.skip(4, "constant pool operand")?;
                pool.push(ConstantPoolEntry::Other);
            }
            5 | 6 => {
                // Long, Double: two u4 operands, occupies two pool slots.
                r.skip(8, "constant pool operand")?;
                pool.push(ConstantPoolEntry::Other);
                pool.push(ConstantPoolEntry::Padding);
                i += 1;
            }
            9 | 10 | 11 | 12 | 17 | 18 => {
                // Fieldref, Methodref, InterfaceMethodref, NameAndType,
                // Dynamic, InvokeDynamic: two u2 operands.
                r.skip(4, "constant pool operand")?;
                pool.push(ConstantPoolEntry::Other);
            }
            15 => {
                // MethodHandle: u1 + u2 operands.
                r.skip(3, "constant pool operand")?;
                pool.push(ConstantPoolEntry::Other);
            }
            _ => {
                return Err(ParseError::Truncated("unknown constant pool tag"));
            }
        }
        i += 1;
    }

    Ok(pool)
}

fn resolve_utf8(pool: &[ConstantPoolEntry], index: u16) -> Result<String> {
    match pool.get(index as usize) {
        Some(ConstantPoolEntry::Utf8(s)) => Ok(s.clone()),
        Some(_) => Err(ParseError::NotUtf8(index)),
        None => Err(ParseError::BadConstantPoolIndex(index)),
    }
}

fn resolve_class_name(pool: &[ConstantPoolEntry], index: u16) -> Result<String> {
    match pool.get(index as usize) {
        Some(ConstantPoolEntry::Class { name_index }) => resolve_utf8(pool, *name_index),
        Some(_) => Err(ParseError::NotUtf8(index)),
        None => Err(ParseError::BadConstantPoolIndex(index)),
    }
}

fn skip_attributes(r: &mut Reader) -> Result<()> {
    let count = r.u2("attributes_count")?;
    for _ in 0..count {
        let _name_index = r.u2("attribute name_index")?;
        let len = r.u4("attribute_length")?;
        r.skip(len as usize, "attribute info")?;
    }
    Ok(())
}

/// Like [`skip_attributes`] but captures the `Code` attribute's raw
/// bytes instead of discarding them, since the validator needs to
/// digest method bodies to tell "method-body-only" changes apart from
/// everything else.
fn read_method_attributes(r: &mut Reader) -> Result<Option<Vec<u8>>> {
    let count = r.u2("method attributes_count")?;
    let mut code = None;
    for _ in 0..count {
        // We don't resolve the attribute name against the constant pool
        // here (Code is conventionally the only attribute carrying
        // executable bytes worth digesting for method tables); treat
        // every attribute body as opaque and keep the largest one seen,
        // which in compiler-emitted class files is always Code when
        // present.
        let _name_index = r.u2("method attribute name_index")?;
        let len = r.u4("method attribute_length")?;
        let bytes = r.bytes(len as usize, "method attribute info")?;
        if code.as_ref().map(|c: &Vec<u8>| bytes.len() > c.len()).unwrap_or(true) {
            code = Some(bytes);
        }
    }
    Ok(code)
}
