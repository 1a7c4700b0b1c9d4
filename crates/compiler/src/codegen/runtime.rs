//! The emitted C base
//!
//! Every generated artifact is self-contained: these fragments provide the
//! status representation, the slice/table/io-buffer types and the tilde
//! operator helpers the lowered code leans on. The text is constant so the
//! emission stays byte-for-byte deterministic.

/// Public-header part of the base: types, macros, status declarations.
/// Self-guarded, since every package's header carries a copy.
pub const BASE_PUBLIC: &str = r#"#ifndef SIFT_BASE__HEADER_INCLUDED
#define SIFT_BASE__HEADER_INCLUDED

#define SIFT_VERSION ((uint64_t)0x0000000400000002)

#define SIFT_BASE__MAGIC ((uint32_t)0x3CCB6C71)
#define SIFT_BASE__DISABLED ((uint32_t)0x01DCDCD1)

#define SIFT_INITIALIZE__ALREADY_ZEROED ((uint32_t)0x00000001)

// A status is a tagged string pointer. NULL means ok; otherwise the first
// byte encodes the kind: '$' suspension, '?' error, '#' note, '@' other.
// Statuses compare by pointer equality.
typedef const char* sift_base__status;

#define sift_base__ok NULL

extern const char sift_base__suspension__short_read[];
extern const char sift_base__suspension__short_write[];
extern const char sift_base__error__bad_argument[];
extern const char sift_base__error__bad_receiver[];
extern const char sift_base__error__bad_sizeof_receiver[];
extern const char sift_base__error__bad_version[];
extern const char sift_base__error__disabled_by_previous_error[];
extern const char sift_base__error__initialize_not_called[];

static inline bool sift_base__status__is_error(sift_base__status s) {
  return s && (s[0] == '?');
}

static inline bool sift_base__status__is_suspension(sift_base__status s) {
  return s && (s[0] == '$');
}

typedef struct sift_base__slice_u8__struct { uint8_t* ptr; size_t len; } sift_base__slice_u8;
typedef struct sift_base__slice_u16__struct { uint16_t* ptr; size_t len; } sift_base__slice_u16;
typedef struct sift_base__slice_u32__struct { uint32_t* ptr; size_t len; } sift_base__slice_u32;
typedef struct sift_base__slice_u64__struct { uint64_t* ptr; size_t len; } sift_base__slice_u64;
typedef struct sift_base__slice_i8__struct { int8_t* ptr; size_t len; } sift_base__slice_i8;
typedef struct sift_base__slice_i16__struct { int16_t* ptr; size_t len; } sift_base__slice_i16;
typedef struct sift_base__slice_i32__struct { int32_t* ptr; size_t len; } sift_base__slice_i32;
typedef struct sift_base__slice_i64__struct { int64_t* ptr; size_t len; } sift_base__slice_i64;

#define SIFT_BASE__DEFINE_TABLE(elem, name)  \
  typedef struct name##__struct {            \
    elem* ptr;                               \
    size_t width;                            \
    size_t height;                           \
    size_t stride;                           \
  } name;

SIFT_BASE__DEFINE_TABLE(uint8_t, sift_base__table_u8)
SIFT_BASE__DEFINE_TABLE(uint16_t, sift_base__table_u16)
SIFT_BASE__DEFINE_TABLE(uint32_t, sift_base__table_u32)
SIFT_BASE__DEFINE_TABLE(uint64_t, sift_base__table_u64)
SIFT_BASE__DEFINE_TABLE(int8_t, sift_base__table_i8)
SIFT_BASE__DEFINE_TABLE(int16_t, sift_base__table_i16)
SIFT_BASE__DEFINE_TABLE(int32_t, sift_base__table_i32)
SIFT_BASE__DEFINE_TABLE(int64_t, sift_base__table_i64)

typedef struct sift_base__io_buffer_meta__struct {
  uint64_t wi;  // write index
  uint64_t ri;  // read index
  uint64_t pos;  // position of data.ptr[0] in the stream
  bool closed;  // no further writes are expected
} sift_base__io_buffer_meta;

typedef struct sift_base__io_buffer__struct {
  struct {
    uint8_t* ptr;
    uint64_t len;
  } data;
  sift_base__io_buffer_meta meta;
} sift_base__io_buffer;

static inline uint64_t sift_base__io_buffer__reader_available(const sift_base__io_buffer* b) {
  return b ? (b->meta.wi - b->meta.ri) : 0;
}

static inline uint64_t sift_base__io_buffer__writer_available(const sift_base__io_buffer* b) {
  return b ? (b->data.len - b->meta.wi) : 0;
}

#endif  // SIFT_BASE__HEADER_INCLUDED
"#;

/// Implementation part of the base: status storage and tilde helpers.
/// Exactly one translation unit may define these symbols; when several
/// package implementations link together, define
/// SIFT_CONFIG__SKIP_BASE_IMPLEMENTATION for all but one.
pub const BASE_IMPL: &str = r#"#if !defined(SIFT_BASE__IMPL_INCLUDED) && !defined(SIFT_CONFIG__SKIP_BASE_IMPLEMENTATION)
#define SIFT_BASE__IMPL_INCLUDED

const char sift_base__suspension__short_read[] = "$base: short read";
const char sift_base__suspension__short_write[] = "$base: short write";
const char sift_base__error__bad_argument[] = "?base: bad argument";
const char sift_base__error__bad_receiver[] = "?base: bad receiver";
const char sift_base__error__bad_sizeof_receiver[] = "?base: bad sizeof receiver";
const char sift_base__error__bad_version[] = "?base: bad version";
const char sift_base__error__disabled_by_previous_error[] = "?base: disabled by previous error";
const char sift_base__error__initialize_not_called[] = "?base: initialize not called";

static inline uint8_t sift_base__u8__sat_add(uint8_t x, uint8_t y) {
  uint16_t z = (uint16_t)((uint16_t)x + (uint16_t)y);
  return (z > 0xFF) ? 0xFF : (uint8_t)z;
}

static inline uint8_t sift_base__u8__sat_sub(uint8_t x, uint8_t y) {
  return (x < y) ? 0 : (uint8_t)(x - y);
}

static inline uint16_t sift_base__u16__sat_add(uint16_t x, uint16_t y) {
  uint32_t z = (uint32_t)x + (uint32_t)y;
  return (z > 0xFFFF) ? 0xFFFF : (uint16_t)z;
}

static inline uint16_t sift_base__u16__sat_sub(uint16_t x, uint16_t y) {
  return (x < y) ? 0 : (uint16_t)(x - y);
}

static inline uint32_t sift_base__u32__sat_add(uint32_t x, uint32_t y) {
  uint64_t z = (uint64_t)x + (uint64_t)y;
  return (z > 0xFFFFFFFF) ? 0xFFFFFFFF : (uint32_t)z;
}

static inline uint32_t sift_base__u32__sat_sub(uint32_t x, uint32_t y) {
  return (x < y) ? 0 : (x - y);
}

static inline uint64_t sift_base__u64__sat_add(uint64_t x, uint64_t y) {
  uint64_t z = x + y;
  return (z < x) ? UINT64_MAX : z;
}

static inline uint64_t sift_base__u64__sat_sub(uint64_t x, uint64_t y) {
  return (x < y) ? 0 : (x - y);
}

static inline int8_t sift_base__i8__sat_add(int8_t x, int8_t y) {
  int32_t z = (int32_t)x + (int32_t)y;
  return (z > 0x7F) ? (int8_t)0x7F : ((z < -0x80) ? (int8_t)-0x80 : (int8_t)z);
}

static inline int8_t sift_base__i8__sat_sub(int8_t x, int8_t y) {
  int32_t z = (int32_t)x - (int32_t)y;
  return (z > 0x7F) ? (int8_t)0x7F : ((z < -0x80) ? (int8_t)-0x80 : (int8_t)z);
}

static inline int16_t sift_base__i16__sat_add(int16_t x, int16_t y) {
  int32_t z = (int32_t)x + (int32_t)y;
  return (z > 0x7FFF) ? (int16_t)0x7FFF : ((z < -0x8000) ? (int16_t)-0x8000 : (int16_t)z);
}

static inline int16_t sift_base__i16__sat_sub(int16_t x, int16_t y) {
  int32_t z = (int32_t)x - (int32_t)y;
  return (z > 0x7FFF) ? (int16_t)0x7FFF : ((z < -0x8000) ? (int16_t)-0x8000 : (int16_t)z);
}

static inline int32_t sift_base__i32__sat_add(int32_t x, int32_t y) {
  int64_t z = (int64_t)x + (int64_t)y;
  return (z > INT32_MAX) ? INT32_MAX : ((z < INT32_MIN) ? INT32_MIN : (int32_t)z);
}

static inline int32_t sift_base__i32__sat_sub(int32_t x, int32_t y) {
  int64_t z = (int64_t)x - (int64_t)y;
  return (z > INT32_MAX) ? INT32_MAX : ((z < INT32_MIN) ? INT32_MIN : (int32_t)z);
}

static inline int64_t sift_base__i64__sat_add(int64_t x, int64_t y) {
  uint64_t uz = (uint64_t)x + (uint64_t)y;
  int64_t z = (int64_t)uz;
  if (((x >= 0) == (y >= 0)) && ((z >= 0) != (x >= 0))) {
    return (x >= 0) ? INT64_MAX : INT64_MIN;
  }
  return z;
}

static inline int64_t sift_base__i64__sat_sub(int64_t x, int64_t y) {
  uint64_t uz = (uint64_t)x - (uint64_t)y;
  int64_t z = (int64_t)uz;
  if (((x >= 0) != (y >= 0)) && ((z >= 0) != (x >= 0))) {
    return (x >= 0) ? INT64_MAX : INT64_MIN;
  }
  return z;
}

#endif  // SIFT_BASE__IMPL_INCLUDED
"#;

/// The coroutine suspension point macros, shared by every generated
/// coroutine body.
pub const COROUTINE_MACROS: &str = r#"#ifndef SIFT_BASE__COROUTINE_SUSPENSION_POINT_0
#define SIFT_BASE__COROUTINE_SUSPENSION_POINT_0 case 0:;

#define SIFT_BASE__COROUTINE_SUSPENSION_POINT(n) \
  coro_susp_point = n;                           \
  case n:;
#endif
"#;
