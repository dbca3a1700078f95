//! End-to-end scenarios against hand-built byte arrays, exercising the
//! walker the way a caller would: construct a container, pick a rules
//! adapter, walk, inspect the output.

use std::collections::HashMap;

use pyc_marshal::rules::{OpcodeRemap, Rules, StepResult, TypeCodeRemap};
use pyc_marshal::{header::HeaderDescriptor, Error, IdentityRules, Walker};

fn header_311(ts: u32, size: u32) -> Vec<u8> {
    let mut bytes = vec![0xA7, 0x0D, 0x0D, 0x0A];
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&ts.to_le_bytes());
    bytes.extend_from_slice(&size.to_le_bytes());
    bytes
}

#[test]
fn s1_header_only_passthrough() {
    let mut input = header_311(1_700_000_000, 0);
    input.push(b'N');
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(len, 17);
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn s2_small_tuple_of_two_nones() {
    let mut input = header_311(0, 0);
    input.extend_from_slice(&[0x29, 0x02, 0x4E, 0x4E]);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn s3_interned_ref_round_trip() {
    let mut input = header_311(0, 0);
    // FLAG_REF short-ascii-interned "ab", then a REF back to index 0.
    input.extend_from_slice(&[0xDA, 0x02, b'a', b'b']);
    input.extend_from_slice(&[0x72, 0x00, 0x00, 0x00, 0x00]);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

struct ShortAsciiInternedToNonInterned;

impl Rules for ShortAsciiInternedToNonInterned {
    fn is_compatible(&self, _input: &[u8]) -> bool {
        true
    }
    fn header_parse(&self, input: &[u8], _output: &mut [u8]) -> Result<HeaderDescriptor, Error> {
        pyc_marshal::header::parse_default(&pyc_marshal::buffers::Buffers::new(input.to_vec()))
    }
    fn trailer_finalize(&self, input: &[u8], _output: &[u8]) -> Result<usize, Error> {
        Ok(input.len())
    }
    fn typecode_remap(&self) -> &HashMap<u8, TypeCodeRemap> {
        static MAP: std::sync::OnceLock<HashMap<u8, TypeCodeRemap>> = std::sync::OnceLock::new();
        MAP.get_or_init(|| {
            let mut m = HashMap::new();
            m.insert(0x5A, TypeCodeRemap { t: 0x7A, stride_override: None });
            m
        })
    }
}

#[test]
fn s4_typecode_remap_short_ascii_interned_to_plain() {
    let mut input = header_311(0, 0);
    input.extend_from_slice(&[0x5A, 0x01, b'x']);

    let mut walker = Walker::new(input.clone());
    let len = walker.walk(&ShortAsciiInternedToNonInterned).unwrap();

    let mut expected = input;
    expected[16] = 0x7A;
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn s6_dict_termination() {
    let mut input = header_311(0, 0);
    input.extend_from_slice(&[0x7B, 0x7A, 0x01, b'k', 0x4E, 0x30]);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn long_negative_two_digit_round_trip() {
    // TYPE_LONG, length = -2 (negative, two 15-bit digits), digits 5 and 3.
    let mut input = header_311(0, 0);
    let mut payload = vec![0x6C];
    payload.extend_from_slice(&(-2i32).to_le_bytes());
    payload.extend_from_slice(&[0x05, 0x00, 0x03, 0x00]);
    input.extend_from_slice(&payload);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn long_digit_with_bit_15_set_is_malformed() {
    // TYPE_LONG, length = 1, one digit = 0x8000 — violates the 15-bit
    // marshal digit convention regardless of sign.
    let mut input = header_311(0, 0);
    let mut payload = vec![0x6C];
    payload.extend_from_slice(&1i32.to_le_bytes());
    payload.extend_from_slice(&[0x00, 0x80]);
    input.extend_from_slice(&payload);

    let mut walker = Walker::new(input);
    assert!(matches!(walker.walk(&IdentityRules), Err(Error::MalformedLong { .. })));
}

#[test]
fn int64_round_trip() {
    let mut input = header_311(0, 0);
    let mut payload = vec![0x49];
    payload.extend_from_slice(&(-123_456_789_012_345i64).to_le_bytes());
    input.extend_from_slice(&payload);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn text_float_round_trip() {
    // TYPE_FLOAT, length-prefixed ASCII text "1.5".
    let mut input = header_311(0, 0);
    input.extend_from_slice(&[0x66, 0x03, b'1', b'.', b'5']);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn text_complex_round_trip() {
    // TYPE_COMPLEX: two back-to-back text floats, "1.5" and "2.5".
    let mut input = header_311(0, 0);
    input.extend_from_slice(&[0x78, 0x03, b'1', b'.', b'5', 0x03, b'2', b'.', b'5']);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn binary_complex_round_trip() {
    let mut input = header_311(0, 0);
    let mut payload = vec![0x79];
    payload.extend_from_slice(&1.5f64.to_le_bytes());
    payload.extend_from_slice(&(-2.5f64).to_le_bytes());
    input.extend_from_slice(&payload);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn list_of_two_nones_round_trip() {
    let mut input = header_311(0, 0);
    let mut payload = vec![0x5B];
    payload.extend_from_slice(&2u32.to_le_bytes());
    payload.extend_from_slice(&[0x4E, 0x4E]);
    input.extend_from_slice(&payload);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn set_round_trip() {
    let mut input = header_311(0, 0);
    let mut payload = vec![0x3C];
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.push(0x4E);
    input.extend_from_slice(&payload);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn frozenset_round_trip() {
    let mut input = header_311(0, 0);
    let mut payload = vec![0x3E];
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.push(0x4E);
    input.extend_from_slice(&payload);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

/// A minimal >=3.11 code object whose `code` field carries `64 00 53 00`
/// (`LOAD_CONST 0`; `RETURN_VALUE`). All other fields are trivial
/// placeholders — the walker never type-checks them, only measures and
/// (for `code`) rewrites their contents.
fn code_object_311() -> Vec<u8> {
    let mut bytes = vec![b'c'];
    bytes.extend_from_slice(&0u32.to_le_bytes()); // argc
    bytes.extend_from_slice(&0u32.to_le_bytes()); // posonlyargc
    bytes.extend_from_slice(&0u32.to_le_bytes()); // kwonlyargc
    bytes.extend_from_slice(&2u32.to_le_bytes()); // stacksize
    bytes.extend_from_slice(&0u32.to_le_bytes()); // flags
    bytes.extend_from_slice(&[0x7A, 0x04, 0x64, 0x00, 0x53, 0x00]); // code (short ascii)
    bytes.push(0x4E); // consts
    bytes.push(0x4E); // names
    bytes.push(0x4E); // varnames
    bytes.push(0x4E); // localspluskinds
    bytes.push(0x4E); // filename
    bytes.push(0x4E); // name
    bytes.push(0x4E); // qualname
    bytes.extend_from_slice(&1u32.to_le_bytes()); // firstlineno
    bytes.push(0x4E); // lnotab
    bytes.push(0x4E); // exceptiontable
    bytes
}

#[test]
fn s5_opcode_remap_inside_code_object_is_noop_and_wordcode_stride() {
    struct NoOpRemap;
    impl Rules for NoOpRemap {
        fn is_compatible(&self, _input: &[u8]) -> bool {
            true
        }
        fn header_parse(&self, input: &[u8], _output: &mut [u8]) -> Result<HeaderDescriptor, Error> {
            pyc_marshal::header::parse_default(&pyc_marshal::buffers::Buffers::new(input.to_vec()))
        }
        fn trailer_finalize(&self, input: &[u8], _output: &[u8]) -> Result<usize, Error> {
            Ok(input.len())
        }
        fn opcode_remap(&self) -> &HashMap<Vec<u8>, OpcodeRemap> {
            static MAP: std::sync::OnceLock<HashMap<Vec<u8>, OpcodeRemap>> = std::sync::OnceLock::new();
            MAP.get_or_init(|| {
                let mut m = HashMap::new();
                m.insert(vec![0x64], OpcodeRemap { bytes: Some(vec![0x64]), stride: None });
                m.insert(vec![0x53], OpcodeRemap { bytes: Some(vec![0x53]), stride: None });
                m
            })
        }
    }

    let mut input = header_311(0, 0);
    input.extend_from_slice(&code_object_311());
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&NoOpRemap).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn identity_rules_round_trip_is_byte_identical() {
    let mut input = header_311(0, 0);
    input.extend_from_slice(&code_object_311());

    let mut first = Walker::new(input.clone());
    let len1 = first.walk(&IdentityRules).unwrap();
    let once = first.output()[..len1].to_vec();

    let mut second = Walker::new(once.clone());
    let len2 = second.walk(&IdentityRules).unwrap();
    assert_eq!(&second.output()[..len2], once.as_slice());
}

#[test]
fn nested_list_of_tuple_of_dict_size_accounts_for_children() {
    // list[ tuple(None,) , dict{k: None} ]
    let mut input = header_311(0, 0);
    let mut payload = vec![0x5B, 0x02, 0x00, 0x00, 0x00]; // TYPE_LIST, 2 children
    payload.extend_from_slice(&[0x29, 0x01, 0x4E]); // small tuple of (None,)
    payload.extend_from_slice(&[0x7B, 0x7A, 0x01, b'k', 0x4E, 0x30]); // dict {k: None}
    input.extend_from_slice(&payload);
    let expected = input.clone();

    let mut walker = Walker::new(input);
    let len = walker.walk(&IdentityRules).unwrap();
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn config_rules_toml_fixture_drives_a_real_walk() {
    let toml_text = r#"
        [typecode_remap."0x5A"]
        to = "z"
    "#;
    let rules = pyc_marshal::ConfigRules::from_toml(toml_text).unwrap();

    let mut input = header_311(0, 0);
    input.extend_from_slice(&[0x5A, 0x01, b'x']);

    let mut walker = Walker::new(input.clone());
    let len = walker.walk(&rules).unwrap();

    let mut expected = input;
    expected[16] = b'z';
    assert_eq!(&walker.output()[..len], expected.as_slice());
}

#[test]
fn pre_step_can_abort_the_walk() {
    struct AbortImmediately;
    impl Rules for AbortImmediately {
        fn is_compatible(&self, _input: &[u8]) -> bool {
            true
        }
        fn header_parse(&self, input: &[u8], _output: &mut [u8]) -> Result<HeaderDescriptor, Error> {
            pyc_marshal::header::parse_default(&pyc_marshal::buffers::Buffers::new(input.to_vec()))
        }
        fn trailer_finalize(&self, input: &[u8], _output: &[u8]) -> Result<usize, Error> {
            Ok(input.len())
        }
        fn pre_step(&self, _input: &[u8], _output: &mut [u8], _offset: usize) -> Option<StepResult> {
            Some(StepResult::Abort)
        }
    }

    let mut input = header_311(0, 0);
    input.push(b'N');
    let mut walker = Walker::new(input);
    assert!(matches!(walker.walk(&AbortImmediately), Err(Error::Incompatible)));
}
