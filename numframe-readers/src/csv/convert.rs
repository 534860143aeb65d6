//! Field to value conversion
//!
//! Each supported element type implements [`FromField`]. Numbers are parsed
//! with the dialect's decimal point, exponent marker and thousands separator;
//! floating point scaling goes through exact power-of-ten tables so results
//! do not depend on the platform's `powi`.

use numframe_core::ErrorKind;
use thiserror::Error;

use super::options::Dialect;

/// Why a field could not be converted
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertError {
    /// The field holds no digits where a number was expected
    #[error("no digits found")]
    NoDigits,

    /// The integer does not fit the target range
    #[error("value out of range for {0}")]
    Overflow(&'static str),

    /// The exponent is too large; the value saturates to infinity
    #[error("exponent out of range, value saturates to {}", saturated(.negative))]
    Infinite {
        /// Sign of the saturated value
        negative: bool,
    },

    /// Characters follow the parsed value
    #[error("unexpected characters after the value")]
    TrailingCharacters,

    /// A minus sign in front of an unsigned value
    #[error("negative value for an unsigned type")]
    NegativeUnsigned,

    /// The field is not TRUE or FALSE
    #[error("not a boolean")]
    NotBoolean,
}

fn saturated(negative: &bool) -> &'static str {
    if *negative {
        "-inf"
    } else {
        "inf"
    }
}

impl ConvertError {
    /// Shared error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Overflow(_) => ErrorKind::Overflow,
            _ => ErrorKind::Parsing,
        }
    }
}

/// A successfully converted field
#[derive(Debug, Clone, PartialEq)]
pub struct Converted<T> {
    /// The value
    pub value: T,

    /// The text had no decimal point or exponent
    pub maybe_int: bool,
}

/// Types a CSV field can be converted to
pub trait FromField: Sized + Clone + Send + 'static {
    /// Name used in diagnostics
    const NAME: &'static str;

    /// Convert the bytes of one field
    fn from_field(field: &[u8], dialect: &Dialect) -> Result<Converted<Self>, ConvertError>;

    /// In-band value marking a missing entry
    fn missing() -> Self;
}

#[inline]
fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn skip_spaces(field: &[u8], mut p: usize) -> usize {
    while p < field.len() && is_space(field[p]) {
        p += 1;
    }
    p
}

/// The byte at `p` is a thousands separator sitting between two digits
#[inline]
fn is_separator(field: &[u8], p: usize, thousands: Option<u8>) -> bool {
    thousands.is_some_and(|t| field[p] == t)
        && field.get(p + 1).is_some_and(u8::is_ascii_digit)
}

fn trailing(field: &[u8], p: usize, skip_spaces_after: bool) -> Result<(), ConvertError> {
    let end = if skip_spaces_after { skip_spaces(field, p) } else { p };
    if end == field.len() {
        Ok(())
    } else {
        Err(ConvertError::TrailingCharacters)
    }
}

const POW10_F64: [f64; 309] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9,
    1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16, 1e17, 1e18, 1e19,
    1e20, 1e21, 1e22, 1e23, 1e24, 1e25, 1e26, 1e27, 1e28, 1e29,
    1e30, 1e31, 1e32, 1e33, 1e34, 1e35, 1e36, 1e37, 1e38, 1e39,
    1e40, 1e41, 1e42, 1e43, 1e44, 1e45, 1e46, 1e47, 1e48, 1e49,
    1e50, 1e51, 1e52, 1e53, 1e54, 1e55, 1e56, 1e57, 1e58, 1e59,
    1e60, 1e61, 1e62, 1e63, 1e64, 1e65, 1e66, 1e67, 1e68, 1e69,
    1e70, 1e71, 1e72, 1e73, 1e74, 1e75, 1e76, 1e77, 1e78, 1e79,
    1e80, 1e81, 1e82, 1e83, 1e84, 1e85, 1e86, 1e87, 1e88, 1e89,
    1e90, 1e91, 1e92, 1e93, 1e94, 1e95, 1e96, 1e97, 1e98, 1e99,
    1e100, 1e101, 1e102, 1e103, 1e104, 1e105, 1e106, 1e107, 1e108, 1e109,
    1e110, 1e111, 1e112, 1e113, 1e114, 1e115, 1e116, 1e117, 1e118, 1e119,
    1e120, 1e121, 1e122, 1e123, 1e124, 1e125, 1e126, 1e127, 1e128, 1e129,
    1e130, 1e131, 1e132, 1e133, 1e134, 1e135, 1e136, 1e137, 1e138, 1e139,
    1e140, 1e141, 1e142, 1e143, 1e144, 1e145, 1e146, 1e147, 1e148, 1e149,
    1e150, 1e151, 1e152, 1e153, 1e154, 1e155, 1e156, 1e157, 1e158, 1e159,
    1e160, 1e161, 1e162, 1e163, 1e164, 1e165, 1e166, 1e167, 1e168, 1e169,
    1e170, 1e171, 1e172, 1e173, 1e174, 1e175, 1e176, 1e177, 1e178, 1e179,
    1e180, 1e181, 1e182, 1e183, 1e184, 1e185, 1e186, 1e187, 1e188, 1e189,
    1e190, 1e191, 1e192, 1e193, 1e194, 1e195, 1e196, 1e197, 1e198, 1e199,
    1e200, 1e201, 1e202, 1e203, 1e204, 1e205, 1e206, 1e207, 1e208, 1e209,
    1e210, 1e211, 1e212, 1e213, 1e214, 1e215, 1e216, 1e217, 1e218, 1e219,
    1e220, 1e221, 1e222, 1e223, 1e224, 1e225, 1e226, 1e227, 1e228, 1e229,
    1e230, 1e231, 1e232, 1e233, 1e234, 1e235, 1e236, 1e237, 1e238, 1e239,
    1e240, 1e241, 1e242, 1e243, 1e244, 1e245, 1e246, 1e247, 1e248, 1e249,
    1e250, 1e251, 1e252, 1e253, 1e254, 1e255, 1e256, 1e257, 1e258, 1e259,
    1e260, 1e261, 1e262, 1e263, 1e264, 1e265, 1e266, 1e267, 1e268, 1e269,
    1e270, 1e271, 1e272, 1e273, 1e274, 1e275, 1e276, 1e277, 1e278, 1e279,
    1e280, 1e281, 1e282, 1e283, 1e284, 1e285, 1e286, 1e287, 1e288, 1e289,
    1e290, 1e291, 1e292, 1e293, 1e294, 1e295, 1e296, 1e297, 1e298, 1e299,
    1e300, 1e301, 1e302, 1e303, 1e304, 1e305, 1e306, 1e307, 1e308,
];

const POW10_F32: [f32; 39] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9,
    1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16, 1e17, 1e18, 1e19,
    1e20, 1e21, 1e22, 1e23, 1e24, 1e25, 1e26, 1e27, 1e28, 1e29,
    1e30, 1e31, 1e32, 1e33, 1e34, 1e35, 1e36, 1e37, 1e38,
];

macro_rules! float_parser {
    ($name:ident, $t:ty, $max_digits:expr, $max_exp:expr, $table:ident) => {
        fn $name(field: &[u8], d: &Dialect) -> Result<Converted<$t>, ConvertError> {
            let mut p = skip_spaces(field, 0);
            let negative = sign(field, &mut p);

            let mut number: $t = 0.0;
            let mut exponent: i64 = 0;
            let mut digits = 0usize;
            let mut significant = 0usize;
            let mut maybe_int = true;

            // integer part; digits past the budget only scale the result
            while p < field.len() {
                let c = field[p];
                if c.is_ascii_digit() {
                    digits += 1;
                    if significant < $max_digits {
                        number = number * 10.0 + <$t>::from(c - b'0');
                        if number != 0.0 {
                            significant += 1;
                        }
                    } else {
                        exponent += 1;
                    }
                } else if !is_separator(field, p, d.thousands) {
                    break;
                }
                p += 1;
            }

            if field.get(p) == Some(&d.decimal) {
                maybe_int = false;
                p += 1;
                while let Some(&c) = field.get(p) {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    digits += 1;
                    if significant < $max_digits {
                        number = number * 10.0 + <$t>::from(c - b'0');
                        exponent -= 1;
                        if number != 0.0 {
                            significant += 1;
                        }
                    }
                    p += 1;
                }
            }

            if digits == 0 {
                return Err(ConvertError::NoDigits);
            }

            if field.get(p).is_some_and(|c| c.eq_ignore_ascii_case(&d.sci)) {
                let marker = p;
                p += 1;
                let exp_negative = sign(field, &mut p);
                if field.get(p).is_some_and(u8::is_ascii_digit) {
                    maybe_int = false;
                    let mut n: i64 = 0;
                    while let Some(&c) = field.get(p) {
                        if !c.is_ascii_digit() {
                            break;
                        }
                        n = n.saturating_mul(10).saturating_add(i64::from(c - b'0'));
                        p += 1;
                    }
                    exponent = if exp_negative {
                        exponent.saturating_sub(n)
                    } else {
                        exponent.saturating_add(n)
                    };
                } else {
                    p = marker;
                }
            }

            trailing(field, p, d.skip_trailing_space)?;

            let value = if number == 0.0 {
                0.0
            } else if exponent > $max_exp {
                return Err(ConvertError::Infinite { negative });
            } else if exponent >= 0 {
                number * $table[exponent as usize]
            } else if exponent >= -$max_exp {
                number / $table[(-exponent) as usize]
            } else if exponent >= -2 * $max_exp {
                number / $table[(-$max_exp - exponent) as usize] / $table[$max_exp as usize]
            } else {
                0.0
            };
            if value.is_infinite() {
                return Err(ConvertError::Infinite { negative });
            }
            let value = if negative { -value } else { value };
            Ok(Converted { value, maybe_int })
        }
    };
}

float_parser!(parse_f64, f64, 17, 308, POW10_F64);
float_parser!(parse_f32, f32, 9, 38, POW10_F32);

fn sign(field: &[u8], p: &mut usize) -> bool {
    match field.get(*p) {
        Some(b'-') => {
            *p += 1;
            true
        }
        Some(b'+') => {
            *p += 1;
            false
        }
        _ => false,
    }
}

/// Parse a signed integer within `[min, max]`
///
/// The accumulator is compared against precomputed bounds before every digit
/// so it never leaves the range.
fn parse_signed(
    field: &[u8],
    d: &Dialect,
    min: i64,
    max: i64,
    name: &'static str,
) -> Result<i64, ConvertError> {
    let mut p = skip_spaces(field, 0);
    let negative = sign(field, &mut p);
    if !field.get(p).is_some_and(u8::is_ascii_digit) {
        return Err(ConvertError::NoDigits);
    }

    let mut number: i64 = 0;
    if negative {
        let pre_min = min / 10;
        let dig_pre_min = -(min % 10);
        while p < field.len() {
            let c = field[p];
            if c.is_ascii_digit() {
                let dig = i64::from(c - b'0');
                if number > pre_min || (number == pre_min && dig <= dig_pre_min) {
                    number = number * 10 - dig;
                } else {
                    return Err(ConvertError::Overflow(name));
                }
            } else if !is_separator(field, p, d.thousands) {
                break;
            }
            p += 1;
        }
    } else {
        let pre_max = max / 10;
        let dig_pre_max = max % 10;
        while p < field.len() {
            let c = field[p];
            if c.is_ascii_digit() {
                let dig = i64::from(c - b'0');
                if number < pre_max || (number == pre_max && dig <= dig_pre_max) {
                    number = number * 10 + dig;
                } else {
                    return Err(ConvertError::Overflow(name));
                }
            } else if !is_separator(field, p, d.thousands) {
                break;
            }
            p += 1;
        }
    }

    trailing(field, p, true)?;
    Ok(number)
}

fn parse_unsigned(field: &[u8], d: &Dialect) -> Result<u64, ConvertError> {
    let mut p = skip_spaces(field, 0);
    if sign(field, &mut p) {
        return Err(ConvertError::NegativeUnsigned);
    }
    if !field.get(p).is_some_and(u8::is_ascii_digit) {
        return Err(ConvertError::NoDigits);
    }

    let pre_max = d.uint_max / 10;
    let dig_pre_max = d.uint_max % 10;
    let mut number: u64 = 0;
    while p < field.len() {
        let c = field[p];
        if c.is_ascii_digit() {
            let dig = u64::from(c - b'0');
            if number < pre_max || (number == pre_max && dig <= dig_pre_max) {
                number = number * 10 + dig;
            } else {
                return Err(ConvertError::Overflow("u64"));
            }
        } else if !is_separator(field, p, d.thousands) {
            break;
        }
        p += 1;
    }

    trailing(field, p, true)?;
    Ok(number)
}

fn parse_bool(field: &[u8]) -> Result<u8, ConvertError> {
    let p = skip_spaces(field, 0);
    let rest = &field[p..];
    let (value, len) = if rest.len() >= 4 && rest[..4].eq_ignore_ascii_case(b"true") {
        (1, 4)
    } else if rest.len() >= 5 && rest[..5].eq_ignore_ascii_case(b"false") {
        (0, 5)
    } else {
        return Err(ConvertError::NotBoolean);
    };
    if rest[len..].iter().all(|&c| is_space(c)) {
        Ok(value)
    } else {
        Err(ConvertError::NotBoolean)
    }
}

impl FromField for i64 {
    const NAME: &'static str = "i64";

    fn from_field(field: &[u8], dialect: &Dialect) -> Result<Converted<Self>, ConvertError> {
        let value = parse_signed(field, dialect, dialect.int_min, dialect.int_max, Self::NAME)?;
        Ok(Converted { value, maybe_int: true })
    }

    fn missing() -> Self {
        i64::MAX
    }
}

impl FromField for i32 {
    const NAME: &'static str = "i32";

    fn from_field(field: &[u8], dialect: &Dialect) -> Result<Converted<Self>, ConvertError> {
        let min = dialect.int_min.max(i64::from(i32::MIN));
        let max = dialect.int_max.min(i64::from(i32::MAX));
        let value = parse_signed(field, dialect, min, max, Self::NAME)?;
        let value = i32::try_from(value).map_err(|_| ConvertError::Overflow(Self::NAME))?;
        Ok(Converted { value, maybe_int: true })
    }

    fn missing() -> Self {
        i32::MAX
    }
}

impl FromField for u64 {
    const NAME: &'static str = "u64";

    fn from_field(field: &[u8], dialect: &Dialect) -> Result<Converted<Self>, ConvertError> {
        let value = parse_unsigned(field, dialect)?;
        Ok(Converted { value, maybe_int: true })
    }

    fn missing() -> Self {
        u64::MAX
    }
}

impl FromField for u8 {
    const NAME: &'static str = "bool";

    fn from_field(field: &[u8], _dialect: &Dialect) -> Result<Converted<Self>, ConvertError> {
        let value = parse_bool(field)?;
        Ok(Converted { value, maybe_int: false })
    }

    fn missing() -> Self {
        u8::MAX
    }
}

impl FromField for f64 {
    const NAME: &'static str = "f64";

    fn from_field(field: &[u8], dialect: &Dialect) -> Result<Converted<Self>, ConvertError> {
        parse_f64(field, dialect)
    }

    fn missing() -> Self {
        f64::NAN
    }
}

impl FromField for f32 {
    const NAME: &'static str = "f32";

    fn from_field(field: &[u8], dialect: &Dialect) -> Result<Converted<Self>, ConvertError> {
        parse_f32(field, dialect)
    }

    fn missing() -> Self {
        f32::NAN
    }
}

impl FromField for String {
    const NAME: &'static str = "string";

    /// Never fails; invalid UTF-8 is replaced
    fn from_field(field: &[u8], dialect: &Dialect) -> Result<Converted<Self>, ConvertError> {
        let start = if dialect.skip_initial_space { skip_spaces(field, 0) } else { 0 };
        let mut end = field.len();
        while end > start && is_space(field[end - 1]) {
            end -= 1;
        }
        let value = String::from_utf8_lossy(&field[start..end]).into_owned();
        Ok(Converted { value, maybe_int: false })
    }

    fn missing() -> Self {
        String::new()
    }
}

/// Convert one field with the given dialect
pub fn convert<T: FromField>(field: &[u8], dialect: &Dialect) -> Result<T, ConvertError> {
    T::from_field(field, dialect).map(|c| c.value)
}
