//! Signature value generation for recording rounds.
//!
//! While a block is being recorded, every matcher and every intercepted return
//! position needs a concrete stand-in value. Signature values are drawn from
//! per-type bands that are unlikely to collide with application data, so a
//! later pass can find where each one ended up.
//!
//! Band policy: integer signatures sit two bits below the type's maximum
//! magnitude (`[2^(bits-3), 2^(bits-2))`, either sign). That keeps them far
//! from everyday literals while leaving headroom for derived arithmetic such as
//! doubling or unit scaling. Bytes are too narrow for that: their band is
//! `[-64, -32)`, outside ASCII, where doubling still fits in an `i8`. Durations stay within `[2^20, 2^30)` seconds so
//! they survive addition to any realistic `SystemTime`. Types with only a
//! handful of values (`bool`, `()`) are not distinguishable and alternate by
//! round parity instead.

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::value::{ObjectRef, Value, ValueType, PLACEHOLDER_CLASS, SIGNATURE_OBJECT_CLASS};

/// Returned for positions whose concrete shape cannot be determined statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedShapeUnknown;

impl fmt::Display for ExpectedShapeUnknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected shape is not statically known")
    }
}

impl std::error::Error for ExpectedShapeUnknown {}

/// Attempts before giving up on drawing a value not yet issued this round.
const MAX_REDRAWS: usize = 16;

/// Signature value generator with band-restricted distributions.
pub struct SignatureGenerator {
    rng: StdRng,
    round: usize,
    issued: Vec<Value>,
}

impl SignatureGenerator {
    /// Create a generator. Without a seed the generator is seeded from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            round: 0,
            issued: Vec::new(),
        }
    }

    /// Forget values issued in the previous round.
    pub fn start_round(&mut self, round: usize) {
        self.round = round;
        self.issued.clear();
    }

    /// Draw a signature value for `ty`, distinct from the values already issued this round.
    pub fn signature_for(&mut self, ty: &ValueType) -> Result<Value, ExpectedShapeUnknown> {
        if *ty == ValueType::Generic {
            return Err(ExpectedShapeUnknown);
        }
        let mut value = self.draw(ty)?;
        if ty.is_distinguishable() {
            let mut redraws = 0;
            while self.issued.contains(&value) && redraws < MAX_REDRAWS {
                value = self.draw(ty)?;
                redraws += 1;
            }
            self.issued.push(value.clone());
        }
        Ok(value)
    }

    /// Stand-in returned from positions whose shape is unknown.
    pub fn placeholder(&mut self) -> Value {
        Value::Object(ObjectRef::new(PLACEHOLDER_CLASS))
    }

    /// Fresh object for a matcher in an object or generic argument slot.
    /// Unlike a placeholder it converts to any object type.
    pub fn signature_object(&mut self) -> Value {
        Value::Object(ObjectRef::new(SIGNATURE_OBJECT_CLASS))
    }

    fn draw(&mut self, ty: &ValueType) -> Result<Value, ExpectedShapeUnknown> {
        let value = match ty {
            ValueType::Unit => Value::Unit,
            ValueType::Bool => Value::Bool(self.round % 2 == 0),
            ValueType::Byte => Value::Byte(-(self.rng.gen_range(33..=64) as i8)),
            ValueType::Short => Value::Short(self.signed(1 << 13, 1 << 14) as i16),
            ValueType::Int => Value::Int(self.signed(1 << 29, 1 << 30) as i32),
            ValueType::Long => Value::Long(self.signed(1 << 61, 1 << 62)),
            ValueType::Float => {
                let whole = self.rng.gen_range((1u32 << 20)..(1u32 << 21)) as f32;
                let eighths = self.rng.gen_range(1..8) as f32 * 0.125;
                Value::Float(self.sign() as f32 * (whole + eighths))
            }
            ValueType::Double => {
                let whole = self.rng.gen_range((1u64 << 40)..(1u64 << 41)) as f64;
                let fraction: f64 = self.rng.gen_range(0.001..0.999);
                Value::Double(self.sign() as f64 * (whole + fraction))
            }
            ValueType::Char => {
                let code = self.rng.gen_range(0xE000u32..0xF900);
                Value::Char(char::from_u32(code).unwrap_or('\u{E000}'))
            }
            ValueType::Str => Value::Str(format!("sig:{:016x}", self.rng.gen::<u64>())),
            ValueType::Duration => Value::Duration(Duration::new(
                self.rng.gen_range((1u64 << 20)..(1u64 << 30)),
                self.rng.gen_range(0..1_000_000_000),
            )),
            ValueType::List(element) => Value::List(vec![self.signature_for(element)?]),
            ValueType::Object(class) => Value::Object(ObjectRef::new(class)),
            ValueType::Generic => return Err(ExpectedShapeUnknown),
        };
        Ok(value)
    }

    fn sign(&mut self) -> i64 {
        if self.rng.gen_bool(0.5) {
            1
        } else {
            -1
        }
    }

    fn signed(&mut self, low: i64, high: i64) -> i64 {
        self.sign() * self.rng.gen_range(low..high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_is_unknown() {
        let mut gen = SignatureGenerator::new(Some(1));
        assert_eq!(gen.signature_for(&ValueType::Generic), Err(ExpectedShapeUnknown));
        assert!(gen
            .signature_for(&ValueType::list(ValueType::Generic))
            .is_err());
    }

    #[test]
    fn test_successive_values_are_distinct() {
        let mut gen = SignatureGenerator::new(Some(7));
        for ty in [
            ValueType::Byte,
            ValueType::Short,
            ValueType::Int,
            ValueType::Long,
            ValueType::Float,
            ValueType::Double,
            ValueType::Char,
            ValueType::Str,
            ValueType::Duration,
            ValueType::object("Repo"),
        ] {
            let a = gen.signature_for(&ty).expect("signature");
            let b = gen.signature_for(&ty).expect("signature");
            assert_ne!(a, b, "{ty} signatures collided");
            assert!(ty.accepts(&a));
        }
    }

    #[test]
    fn test_integer_bands_leave_headroom() {
        let mut gen = SignatureGenerator::new(Some(3));
        for _ in 0..200 {
            match gen.signature_for(&ValueType::Int).expect("int") {
                Value::Int(v) => {
                    assert!(v.unsigned_abs() >= 1 << 29);
                    assert!(v.checked_mul(2).is_some());
                }
                other => panic!("unexpected {other:?}"),
            }
            match gen.signature_for(&ValueType::Long).expect("long") {
                Value::Long(v) => assert!(v.checked_mul(2).is_some()),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_byte_band_avoids_ascii() {
        let mut gen = SignatureGenerator::new(Some(9));
        for round in 0..50 {
            gen.start_round(round);
            match gen.signature_for(&ValueType::Byte).expect("byte") {
                Value::Byte(v) => {
                    assert!((-64..-32).contains(&v), "{v} outside the byte band");
                    assert!(v.checked_mul(2).is_some());
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_duration_band_survives_clock_arithmetic() {
        let mut gen = SignatureGenerator::new(Some(11));
        let now = std::time::SystemTime::now();
        for _ in 0..100 {
            if let Value::Duration(d) = gen.signature_for(&ValueType::Duration).expect("duration") {
                assert!(now.checked_add(d).is_some());
                assert!(d.as_millis() < u64::MAX as u128);
            }
        }
    }

    #[test]
    fn test_bool_alternates_by_round() {
        let mut gen = SignatureGenerator::new(Some(5));
        gen.start_round(0);
        let first = gen.signature_for(&ValueType::Bool).expect("bool");
        gen.start_round(1);
        let second = gen.signature_for(&ValueType::Bool).expect("bool");
        assert_ne!(first, second);
    }
}
