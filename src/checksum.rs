//! 인터넷 체크섬 (RFC 1071)
//!
//! 16비트 1의 보수 합, 끝자리 올림(end-around carry) 적용.
//! 체크섬 필드를 포함해 다시 합산하면 유효한 버퍼는 정확히 0이 된다.

/// 버퍼 전체의 인터넷 체크섬 계산
///
/// 홀수 길이면 마지막 바이트를 상위 바이트로 두고 0으로 채운다.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);

    for word in &mut words {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
        // 누적 중 상위 비트가 넘치기 전에 접어둔다
        if sum & 0x8000_0000 != 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
    }

    if let Some(&byte) = words.remainder().first() {
        sum = sum.wrapping_add((byte as u32) << 8);
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// 수신한 바이트가 체크섬 검증을 통과하는지
pub fn verify(data: &[u8]) -> bool {
    internet_checksum(data) == 0
}
