// FHIRPath Data Model
//
// This module defines the system value types and the collection type that
// every operator consumes and produces, together with the equality,
// equivalence, ordering and arithmetic rules between them.

use crate::datetime::{CalendarUnit, PrecisionDate, PrecisionDateTime, PrecisionTime};
use crate::element::Element;
use crate::errors::FhirPathError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

/// FHIRPath system value types
#[derive(Debug, Clone, PartialEq)]
pub enum FhirPathValue {
    Boolean(bool),
    /// Signed 32-bit integer semantics
    Integer(i32),
    Decimal(Decimal),
    String(String),
    Date(PrecisionDate),
    DateTime(PrecisionDateTime),
    Time(PrecisionTime),
    Quantity(Quantity),
    /// Handle to a node of a schema-typed resource tree
    Element(Element),
}

/// A decimal value with a UCUM or calendar unit
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: String,
}

impl Quantity {
    /// Units are stored in singular form so that `4 days` and `4 day`
    /// compare equal.
    pub fn new(value: Decimal, unit: &str) -> Self {
        let unit = match CalendarUnit::parse(unit) {
            Some(CalendarUnit::Year) if unit.starts_with("year") => "year",
            Some(CalendarUnit::Month) if unit.starts_with("month") => "month",
            Some(CalendarUnit::Week) if unit.starts_with("week") => "week",
            Some(CalendarUnit::Day) if unit.starts_with("day") => "day",
            Some(CalendarUnit::Hour) if unit.starts_with("hour") => "hour",
            Some(CalendarUnit::Minute) if unit.starts_with("minute") => "minute",
            Some(CalendarUnit::Second) if unit.starts_with("second") => "second",
            Some(CalendarUnit::Millisecond) if unit.starts_with("millisecond") => "millisecond",
            _ => unit,
        };
        Quantity {
            value,
            unit: unit.to_string(),
        }
    }

    /// The time-valued unit, if this quantity has one.
    pub fn calendar_unit(&self) -> Option<CalendarUnit> {
        CalendarUnit::parse(&self.unit)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.value, self.unit)
    }
}

impl fmt::Display for FhirPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirPathValue::Boolean(b) => write!(f, "{}", b),
            FhirPathValue::Integer(i) => write!(f, "{}", i),
            FhirPathValue::Decimal(d) => write!(f, "{}", d),
            FhirPathValue::String(s) => write!(f, "{}", s),
            FhirPathValue::Date(d) => write!(f, "{}", d),
            FhirPathValue::DateTime(d) => write!(f, "{}", d),
            FhirPathValue::Time(t) => write!(f, "{}", t),
            FhirPathValue::Quantity(q) => write!(f, "{}", q),
            FhirPathValue::Element(e) => write!(f, "{}", e.to_json()),
        }
    }
}

impl FhirPathValue {
    /// System type name, or the FHIR type name for elements.
    pub fn type_name(&self) -> String {
        match self {
            FhirPathValue::Boolean(_) => "Boolean".to_string(),
            FhirPathValue::Integer(_) => "Integer".to_string(),
            FhirPathValue::Decimal(_) => "Decimal".to_string(),
            FhirPathValue::String(_) => "String".to_string(),
            FhirPathValue::Date(_) => "Date".to_string(),
            FhirPathValue::DateTime(_) => "DateTime".to_string(),
            FhirPathValue::Time(_) => "Time".to_string(),
            FhirPathValue::Quantity(_) => "Quantity".to_string(),
            FhirPathValue::Element(e) => e.type_name(),
        }
    }

    pub fn is_system(&self) -> bool {
        !matches!(self, FhirPathValue::Element(_))
    }
}

/// Unwraps FHIR primitive and Quantity elements to their system
/// counterparts; all other values pass through unchanged.
pub fn normalize(value: &FhirPathValue) -> FhirPathValue {
    if let FhirPathValue::Element(element) = value {
        if let Some(primitive) = element.primitive_value() {
            return primitive;
        }
        if let Some(quantity) = element.quantity_value() {
            return FhirPathValue::Quantity(quantity);
        }
    }
    value.clone()
}

/// Ordered, possibly heterogeneous sequence of values; the universal
/// input and output of every FHIRPath operator. An empty collection is
/// the FHIRPath `empty` value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection(Vec<FhirPathValue>);

impl Collection {
    pub fn new() -> Self {
        Collection(Vec::new())
    }

    pub fn singleton(value: FhirPathValue) -> Self {
        Collection(vec![value])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FhirPathValue> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&FhirPathValue> {
        self.0.get(index)
    }

    pub fn push(&mut self, value: FhirPathValue) {
        self.0.push(value);
    }

    pub fn extend(&mut self, other: Collection) {
        self.0.extend(other.0);
    }

    pub fn values(&self) -> &[FhirPathValue] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<FhirPathValue> {
        self.0
    }

    /// Zero items is `None`, one item is `Some`, more is `NotSingleton`.
    pub fn as_singleton(&self) -> Result<Option<&FhirPathValue>, FhirPathError> {
        match self.0.len() {
            0 => Ok(None),
            1 => Ok(Some(&self.0[0])),
            n => Err(FhirPathError::NotSingleton(n)),
        }
    }

    /// Boolean operand coercion: empty is unknown, a boolean singleton is
    /// itself, any other singleton is true.
    pub fn to_boolean(&self) -> Result<Option<bool>, FhirPathError> {
        match self.as_singleton()? {
            None => Ok(None),
            Some(value) => match normalize(value) {
                FhirPathValue::Boolean(b) => Ok(Some(b)),
                _ => Ok(Some(true)),
            },
        }
    }

    /// Collection equality for `=`: empty operands are indeterminate,
    /// differing lengths are false, otherwise pairwise in order.
    pub fn equals(&self, other: &Collection) -> Option<bool> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        if self.len() != other.len() {
            return Some(false);
        }
        let mut indeterminate = false;
        for (left, right) in self.iter().zip(other.iter()) {
            match equals(left, right) {
                Some(true) => {}
                Some(false) => return Some(false),
                None => indeterminate = true,
            }
        }
        if indeterminate {
            None
        } else {
            Some(true)
        }
    }

    /// Collection equivalence for `~`: empty ~ empty is true, comparison
    /// is order-independent.
    pub fn equivalent(&self, other: &Collection) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut remaining: Vec<&FhirPathValue> = other.iter().collect();
        for left in self.iter() {
            match remaining.iter().position(|right| equivalent(left, right)) {
                Some(i) => {
                    remaining.swap_remove(i);
                }
                None => return false,
            }
        }
        true
    }

    /// Membership for `in`/`contains`.
    pub fn contains_value(&self, value: &FhirPathValue) -> bool {
        self.iter().any(|item| equals(item, value) == Some(true))
    }
}

impl From<Vec<FhirPathValue>> for Collection {
    fn from(values: Vec<FhirPathValue>) -> Self {
        Collection(values)
    }
}

impl From<FhirPathValue> for Collection {
    fn from(value: FhirPathValue) -> Self {
        Collection(vec![value])
    }
}

impl From<Element> for FhirPathValue {
    fn from(element: Element) -> Self {
        FhirPathValue::Element(element)
    }
}

impl FromIterator<FhirPathValue> for Collection {
    fn from_iter<I: IntoIterator<Item = FhirPathValue>>(iter: I) -> Self {
        Collection(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = FhirPathValue;
    type IntoIter = std::vec::IntoIter<FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a FhirPathValue;
    type IntoIter = std::slice::Iter<'a, FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Equality and equivalence

/// Strict singleton equality; `None` when the comparison is
/// indeterminate (temporal precision mismatch, incomparable types).
pub fn equals(left: &FhirPathValue, right: &FhirPathValue) -> Option<bool> {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    match (&left, &right) {
        (Boolean(a), Boolean(b)) => Some(a == b),
        (Integer(a), Integer(b)) => Some(a == b),
        (Integer(a), Decimal(b)) => Some(&rust_decimal::Decimal::from(*a) == b),
        (Decimal(a), Integer(b)) => Some(a == &rust_decimal::Decimal::from(*b)),
        (Decimal(a), Decimal(b)) => Some(a == b),
        (String(a), String(b)) => Some(a == b),
        (Date(a), Date(b)) => a.compare(b).map(|o| o == Ordering::Equal),
        (DateTime(a), DateTime(b)) => a.compare(b).map(|o| o == Ordering::Equal),
        (Date(a), DateTime(b)) => a.to_datetime().compare(b).map(|o| o == Ordering::Equal),
        (DateTime(a), Date(b)) => a.compare(&b.to_datetime()).map(|o| o == Ordering::Equal),
        (Time(a), Time(b)) => a.compare(b).map(|o| o == Ordering::Equal),
        (Quantity(a), Quantity(b)) => {
            if a.unit == b.unit {
                Some(a.value == b.value)
            } else {
                Some(false)
            }
        }
        (Integer(a), Quantity(b)) | (Quantity(b), Integer(a)) => {
            Some(b.unit == "1" && rust_decimal::Decimal::from(*a) == b.value)
        }
        (Decimal(a), Quantity(b)) | (Quantity(b), Decimal(a)) => {
            Some(b.unit == "1" && *a == b.value)
        }
        (Element(a), Element(b)) => Some(a == b),
        _ => None,
    }
}

fn normalize_string(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Equivalence for `~`: never indeterminate.
pub fn equivalent(left: &FhirPathValue, right: &FhirPathValue) -> bool {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    match (&left, &right) {
        (String(a), String(b)) => normalize_string(a) == normalize_string(b),
        (Decimal(a), Decimal(b)) => {
            // compare at the coarser of the two scales
            let scale = a.scale().min(b.scale());
            a.round_dp(scale) == b.round_dp(scale)
        }
        (Integer(a), Decimal(b)) | (Decimal(b), Integer(a)) => {
            b.round_dp(0) == rust_decimal::Decimal::from(*a)
        }
        (Quantity(a), Quantity(b)) => {
            a.unit == b.unit && equivalent(&Decimal(a.value), &Decimal(b.value))
        }
        _ => equals(&left, &right).unwrap_or(false),
    }
}

/// Ordering for the comparison operators. `Ok(None)` means empty
/// (indeterminate precision); incomparable types are a type error.
pub fn compare(
    left: &FhirPathValue,
    right: &FhirPathValue,
) -> Result<Option<Ordering>, FhirPathError> {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    let result = match (&left, &right) {
        (Integer(a), Integer(b)) => Some(a.cmp(b)),
        (Integer(a), Decimal(b)) => Some(rust_decimal::Decimal::from(*a).cmp(b)),
        (Decimal(a), Integer(b)) => Some(a.cmp(&rust_decimal::Decimal::from(*b))),
        (Decimal(a), Decimal(b)) => Some(a.cmp(b)),
        (String(a), String(b)) => Some(a.cmp(b)),
        (Date(a), Date(b)) => a.compare(b),
        (DateTime(a), DateTime(b)) => a.compare(b),
        (Date(a), DateTime(b)) => a.to_datetime().compare(b),
        (DateTime(a), Date(b)) => a.compare(&b.to_datetime()),
        (Time(a), Time(b)) => a.compare(b),
        (Quantity(a), Quantity(b)) if a.unit == b.unit => Some(a.value.cmp(&b.value)),
        _ => {
            return Err(FhirPathError::TypeMismatch(format!(
                "cannot compare {} with {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(result)
}

// ---------------------------------------------------------------------------
// Three-valued logic

pub fn and3(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

pub fn or3(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn xor3(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(a), Some(b)) => Some(a != b),
        _ => None,
    }
}

pub fn implies3(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) => Some(true),
        (Some(true), r) => r,
        (None, Some(true)) => Some(true),
        (None, _) => None,
    }
}

pub fn not3(operand: Option<bool>) -> Option<bool> {
    operand.map(|b| !b)
}

// ---------------------------------------------------------------------------
// Arithmetic

/// Binary arithmetic; `Ok(None)` is empty (division by zero for `/` and
/// `mod`, unsupported temporal step).
pub fn add(
    left: &FhirPathValue,
    right: &FhirPathValue,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    let result = match (&left, &right) {
        (Integer(a), Integer(b)) => {
            Some(Integer(a.checked_add(*b).ok_or(FhirPathError::Overflow("+"))?))
        }
        (Integer(a), Decimal(b)) => Some(Decimal(rust_decimal::Decimal::from(*a) + b)),
        (Decimal(a), Integer(b)) => Some(Decimal(a + rust_decimal::Decimal::from(*b))),
        (Decimal(a), Decimal(b)) => Some(Decimal(a + b)),
        (String(a), String(b)) => Some(String(format!("{}{}", a, b))),
        (Quantity(a), Quantity(b)) if a.unit == b.unit => {
            Some(Quantity(self::Quantity::new(a.value + b.value, &a.unit)))
        }
        (Date(date), Quantity(q)) => add_quantity_to_date(date, q, 1)?,
        (DateTime(datetime), Quantity(q)) => add_quantity_to_datetime(datetime, q, 1)?,
        (Time(time), Quantity(q)) => add_quantity_to_time(time, q, 1)?,
        _ => {
            return Err(FhirPathError::TypeMismatch(format!(
                "cannot add {} and {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(result)
}

pub fn subtract(
    left: &FhirPathValue,
    right: &FhirPathValue,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    let result = match (&left, &right) {
        (Integer(a), Integer(b)) => {
            Some(Integer(a.checked_sub(*b).ok_or(FhirPathError::Overflow("-"))?))
        }
        (Integer(a), Decimal(b)) => Some(Decimal(rust_decimal::Decimal::from(*a) - b)),
        (Decimal(a), Integer(b)) => Some(Decimal(a - rust_decimal::Decimal::from(*b))),
        (Decimal(a), Decimal(b)) => Some(Decimal(a - b)),
        (Quantity(a), Quantity(b)) if a.unit == b.unit => {
            Some(Quantity(self::Quantity::new(a.value - b.value, &a.unit)))
        }
        (Date(date), Quantity(q)) => add_quantity_to_date(date, q, -1)?,
        (DateTime(datetime), Quantity(q)) => add_quantity_to_datetime(datetime, q, -1)?,
        (Time(time), Quantity(q)) => add_quantity_to_time(time, q, -1)?,
        _ => {
            return Err(FhirPathError::TypeMismatch(format!(
                "cannot subtract {} from {}",
                right.type_name(),
                left.type_name()
            )))
        }
    };
    Ok(result)
}

pub fn multiply(
    left: &FhirPathValue,
    right: &FhirPathValue,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    let result = match (&left, &right) {
        (Integer(a), Integer(b)) => {
            Some(Integer(a.checked_mul(*b).ok_or(FhirPathError::Overflow("*"))?))
        }
        (Integer(a), Decimal(b)) => Some(Decimal(rust_decimal::Decimal::from(*a) * b)),
        (Decimal(a), Integer(b)) => Some(Decimal(a * rust_decimal::Decimal::from(*b))),
        (Decimal(a), Decimal(b)) => Some(Decimal(a * b)),
        (Quantity(q), Integer(n)) | (Integer(n), Quantity(q)) => Some(Quantity(
            self::Quantity::new(q.value * rust_decimal::Decimal::from(*n), &q.unit),
        )),
        (Quantity(q), Decimal(d)) | (Decimal(d), Quantity(q)) => {
            Some(Quantity(self::Quantity::new(q.value * d, &q.unit)))
        }
        _ => {
            return Err(FhirPathError::TypeMismatch(format!(
                "cannot multiply {} and {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(result)
}

pub fn divide(
    left: &FhirPathValue,
    right: &FhirPathValue,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    let (a, b) = match (&left, &right) {
        (Quantity(q), Integer(n)) => {
            let divisor = rust_decimal::Decimal::from(*n);
            if divisor.is_zero() {
                return Ok(None);
            }
            return Ok(Some(Quantity(self::Quantity::new(q.value / divisor, &q.unit))));
        }
        (Quantity(q), Decimal(d)) => {
            if d.is_zero() {
                return Ok(None);
            }
            return Ok(Some(Quantity(self::Quantity::new(q.value / d, &q.unit))));
        }
        (Integer(a), Integer(b)) => (rust_decimal::Decimal::from(*a), rust_decimal::Decimal::from(*b)),
        (Integer(a), Decimal(b)) => (rust_decimal::Decimal::from(*a), *b),
        (Decimal(a), Integer(b)) => (*a, rust_decimal::Decimal::from(*b)),
        (Decimal(a), Decimal(b)) => (*a, *b),
        _ => {
            return Err(FhirPathError::TypeMismatch(format!(
                "cannot divide {} by {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };

    if b.is_zero() {
        return Ok(None);
    }
    Ok(Some(Decimal(a / b)))
}

pub fn integer_divide(
    left: &FhirPathValue,
    right: &FhirPathValue,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    let result = match (&left, &right) {
        (Integer(a), Integer(b)) => {
            if *b == 0 {
                return Err(FhirPathError::DivideByZero);
            }
            Integer(a.checked_div(*b).ok_or(FhirPathError::Overflow("div"))?)
        }
        (Integer(_), Decimal(_)) | (Decimal(_), Integer(_)) | (Decimal(_), Decimal(_)) => {
            let a = as_decimal(&left)?;
            let b = as_decimal(&right)?;
            if b.is_zero() {
                return Err(FhirPathError::DivideByZero);
            }
            let quotient = (a / b).trunc();
            Integer(
                quotient
                    .to_i32()
                    .ok_or(FhirPathError::Overflow("div"))?,
            )
        }
        _ => {
            return Err(FhirPathError::TypeMismatch(format!(
                "cannot apply div to {} and {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(Some(result))
}

pub fn modulo(
    left: &FhirPathValue,
    right: &FhirPathValue,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    use FhirPathValue::*;

    let left = normalize(left);
    let right = normalize(right);

    let result = match (&left, &right) {
        (Integer(a), Integer(b)) => {
            if *b == 0 {
                return Ok(None);
            }
            Integer(a % b)
        }
        (Integer(_), Decimal(_)) | (Decimal(_), Integer(_)) | (Decimal(_), Decimal(_)) => {
            let a = as_decimal(&left)?;
            let b = as_decimal(&right)?;
            if b.is_zero() {
                return Ok(None);
            }
            Decimal(a % b)
        }
        _ => {
            return Err(FhirPathError::TypeMismatch(format!(
                "cannot apply mod to {} and {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(Some(result))
}

/// Numeric coercion used by arithmetic and the math functions.
pub fn as_decimal(value: &FhirPathValue) -> Result<Decimal, FhirPathError> {
    match normalize(value) {
        FhirPathValue::Integer(i) => Ok(rust_decimal::Decimal::from(i)),
        FhirPathValue::Decimal(d) => Ok(d),
        FhirPathValue::Quantity(q) => Ok(q.value),
        other => Err(FhirPathError::TypeMismatch(format!(
            "expected a number, got {}",
            other.type_name()
        ))),
    }
}

fn whole_units(q: &Quantity, sign: i64) -> Result<(i64, CalendarUnit), FhirPathError> {
    let unit = q.calendar_unit().ok_or_else(|| {
        FhirPathError::TypeMismatch(format!("'{}' is not a time-valued unit", q.unit))
    })?;
    let amount = q
        .value
        .trunc()
        .to_i64()
        .ok_or(FhirPathError::Overflow("temporal arithmetic"))?;
    Ok((amount * sign, unit))
}

fn add_quantity_to_date(
    date: &PrecisionDate,
    q: &Quantity,
    sign: i64,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    let (amount, unit) = whole_units(q, sign)?;
    Ok(date.add_calendar(amount, unit).map(FhirPathValue::Date))
}

fn add_quantity_to_datetime(
    datetime: &PrecisionDateTime,
    q: &Quantity,
    sign: i64,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    let (amount, unit) = whole_units(q, sign)?;
    Ok(datetime.add_calendar(amount, unit).map(FhirPathValue::DateTime))
}

fn add_quantity_to_time(
    time: &PrecisionTime,
    q: &Quantity,
    sign: i64,
) -> Result<Option<FhirPathValue>, FhirPathError> {
    use chrono::Duration;

    let (amount, unit) = whole_units(q, sign)?;
    let duration = match unit {
        CalendarUnit::Hour => Duration::hours(amount),
        CalendarUnit::Minute => Duration::minutes(amount),
        CalendarUnit::Second => Duration::seconds(amount),
        CalendarUnit::Millisecond => Duration::milliseconds(amount),
        _ => return Ok(None),
    };
    let shifted = time.time.overflowing_add_signed(duration).0;
    Ok(Some(FhirPathValue::Time(PrecisionTime::new(
        shifted,
        time.precision,
    ))))
}

/// String concatenation for `&`: empty operands read as ''.
pub fn concat(left: Option<&str>, right: Option<&str>) -> FhirPathValue {
    FhirPathValue::String(format!(
        "{}{}",
        left.unwrap_or_default(),
        right.unwrap_or_default()
    ))
}
