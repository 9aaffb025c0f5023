//! Runtime support compiled into every translation unit.

/// Host shims so the same unit builds with a plain C++ compiler. Kept outside
/// the packing pragma so system headers keep their own layout.
pub const HOST_SHIM: &str = r#"#ifndef __CUDACC__
#include <math.h>
#define __device__
#define __global__
struct dim3 {
    unsigned int x, y, z;
};
static dim3 blockIdx, blockDim, threadIdx;
#endif"#;

/// Device-side builtins, the collection view and the loop iterators.
///
/// `List<T>` is a non-owning view over `length` packed elements; captured
/// collections and nested inputs are wrapped in one inside the entry kernel.
pub const PRELUDE: &str = r#"template <typename... Args>
__device__ void print(Args... args) {}

template <typename T>
__device__ T py_abs(T x) {
    return x < 0 ? -x : x;
}

template <typename A, typename B>
__device__ auto py_min(A a, B b) -> decltype(a + b) {
    return b < a ? b : a;
}

template <typename A, typename B>
__device__ auto py_max(A a, B b) -> decltype(a + b) {
    return a < b ? b : a;
}

// Integer power with two's-complement wraparound. A negative exponent
// truncates the real-valued result.
__device__ int py_ipow(int base, int exp) {
    if (exp < 0) {
        return int(pow(double(base), double(exp)));
    }
    unsigned int result = 1;
    unsigned int factor = (unsigned int) base;
    while (exp > 0) {
        if (exp & 1) {
            result *= factor;
        }
        factor *= factor;
        exp >>= 1;
    }
    return (int) result;
}

template <typename T>
class List {
    public:
        int length;
        T *items;
        __device__ List(int length, T *items) : length(length), items(items) {};
        __device__ T& operator[](int index) {
            return items[index < 0 ? index + length : index];
        };
};

template <typename T>
__device__ int len(List<T>& list) {
    return list.length;
}

template <typename T>
class ListIterator {
    public:
        int curr_idx;
        List<T>& list;
        __device__ ListIterator(List<T>& list) : curr_idx(0), list(list) {};
        __device__ T& next() {
            return list.items[curr_idx++];
        };
        __device__ bool has_next() {
            return curr_idx < list.length;
        };
};

class RangeIterator {
    public:
        int last;
        int stop;
        int step;
        __device__ RangeIterator(int start, int stop, int step) : last(start), stop(stop), step(step) {};
        __device__ int next() {
            int current = last;
            last += step;
            return current;
        };
        __device__ bool has_next() {
            return step > 0 ? last < stop : (step < 0 && last > stop);
        };
};"#;
