//! User-facing Thai texts and model prompts.

use crate::llm::LlmError;
use crate::plate::PlateReading;

pub const OCR_PROMPT: &str = "อ่านป้ายทะเบียนรถไทยในภาพนี้ \
ตอบรูปแบบ:\nเลขทะเบียน: [ที่อ่านได้]\nจังหวัด: [ที่อ่านได้]\n\
(ถ้าไม่ชัดเจน ตอบ 'ไม่ชัดเจน')";

pub const FRAME_PROMPT: &str =
    "อ่านป้ายทะเบียนรถไทยในภาพเฟรมนี้ ตอบรูปแบบ: [เลขทะเบียน],[จังหวัด] (ถ้าไม่พบ ตอบ 'ไม่พบ')";

pub const SYSTEM_INSTRUCTION: &str = "คุณคือแชทบอทผู้ช่วยอัจฉริยะ ที่เชี่ยวชาญการอ่านป้ายทะเบียนรถไทย \
หน้าที่คือคุยทั่วไป ถ้าผู้ใช้ขอให้อ่านป้าย ให้ตอบว่า 'ส่งรูปภาพหรือวิดีโอมาได้เลย' \
ถ้าผู้ใช้ต้องการดูป้ายที่บันทึกไว้ ให้แนะนำให้พิมพ์ 'รายงาน'";

pub const UNSUPPORTED_EVENT: &str =
    "ไม่เข้าใจครับ กรุณาส่ง ข้อความ, รูปภาพ, หรือ วิดีโอ เท่านั้น 😅";

pub const CHAT_NOT_READY: &str = "ขออภัย สมองผมยังไม่พร้อม";
pub const SESSION_RESET: &str = "เริ่มบทสนทนาใหม่แล้วครับ 🧹";

pub const VIDEO_RECEIVED: &str = "รับวิดีโอแล้ว กำลังประมวลผล (AI Vision)... ⏳";
pub const VIDEO_SUMMARY_HEADER: &str = "ผลประมวลผลวิดีโอ:";
pub const VIDEO_NO_PLATES: &str = "ไม่พบป้ายทะเบียน";
pub const VIDEO_MORE: &str = "(และอื่นๆ...)";

pub const EXPLANATION_HEADER: &str = "--- ข้อมูลป้าย ---";
pub const EXPLANATION_FAILED: &str = "(ไม่สามารถดึงข้อมูลป้ายได้)";
pub const EXPLANATION_UNAVAILABLE: &str = "(ระบบแชทยังไม่พร้อมสำหรับอธิบายป้าย)";

pub const REPORT_HEADER: &str = "ป้ายทะเบียนล่าสุด:";
pub const REPORT_EMPTY: &str = "ยังไม่มีป้ายทะเบียนที่บันทึกไว้";
pub const REPORT_NO_STORE: &str = "ยังไม่ได้ตั้งค่าฐานข้อมูลสำหรับเก็บประวัติป้ายทะเบียน";
pub const REPORT_FAILED: &str = "ขออภัย ดึงรายงานไม่สำเร็จ กรุณาลองใหม่ภายหลัง";

/// Question asked of the chat model about a freshly read plate.
pub fn explain_prompt(reading: &PlateReading) -> String {
    format!(
        "ป้ายทะเบียนไทย '{}' จังหวัด '{}' เป็นป้ายของ **รถยนต์** หรือ **รถจักรยานยนต์**? \
         และเป็นป้ายประเภทใด (เช่น ส่วนบุคคล, สาธารณะ) \
         มีความหมาย/ลักษณะอย่างไร (สีพื้นหลัง, สีตัวอักษร)?",
        reading.plate_number, reading.province
    )
}

/// Short Thai description of a model failure, by kind.
pub fn describe_llm_error(e: &LlmError) -> &'static str {
    match e {
        LlmError::DeadlineExceeded(_) => "AI ตอบช้าเกินไป (หมดเวลา)",
        LlmError::Service(_) => "บริการ AI ขัดข้อง",
        LlmError::MalformedResponse(_) => "AI ตอบกลับในรูปแบบที่อ่านไม่ได้",
    }
}

pub fn chat_failed(e: &LlmError) -> String {
    format!("ขออภัย สมองผมมีปัญหา: {}", describe_llm_error(e))
}

/// Push text for a finished video: at most `max_listed` readings in first-seen order.
pub fn video_summary(readings: &[PlateReading], max_listed: usize) -> String {
    if readings.is_empty() {
        return format!("{}\n{}", VIDEO_SUMMARY_HEADER, VIDEO_NO_PLATES);
    }
    let mut out = VIDEO_SUMMARY_HEADER.to_string();
    for r in readings.iter().take(max_listed) {
        out.push('\n');
        out.push_str(&r.label());
    }
    if readings.len() > max_listed {
        out.push('\n');
        out.push_str(VIDEO_MORE);
    }
    out
}
