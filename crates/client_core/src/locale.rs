//! Canned patient-facing strings for both supported languages.

use shared::domain::Language;

pub fn greeting(language: Language) -> &'static str {
    match language {
        Language::English => "Hello! I'm your ReviveCare medical assistant. I'm here to help with your post-surgery recovery. How are you feeling today?",
        Language::Hindi => "नमस्ते! मैं आपका ReviveCare मेडिकल सहायक हूं। मैं आपके सर्जरी के बाद की रिकवरी में मदद करने के लिए यहां हूं। आप आज कैसा महसूस कर रहे हैं?",
    }
}

pub fn connection_fallback(language: Language) -> &'static str {
    match language {
        Language::English => "I'm having trouble connecting right now. Please try again or contact your doctor if this is urgent.",
        Language::Hindi => "कनेक्ट करने में समस्या हो रही है। कृपया पुनः प्रयास करें।",
    }
}

pub fn info_banner(language: Language) -> &'static str {
    match language {
        Language::English => "If symptoms appear serious, your doctor will be notified automatically",
        Language::Hindi => "यदि लक्षण गंभीर दिखाई देते हैं, तो आपके डॉक्टर को स्वचालित रूप से सूचित किया जाएगा",
    }
}

pub fn input_placeholder(language: Language) -> &'static str {
    match language {
        Language::English => "Type your message...",
        Language::Hindi => "अपना संदेश लिखें...",
    }
}

pub fn quick_suggestions(language: Language) -> [&'static str; 4] {
    match language {
        Language::English => [
            "Can I exercise today?",
            "What about my medications?",
            "I'm experiencing pain",
            "Wound care instructions",
        ],
        Language::Hindi => [
            "क्या मैं आज व्यायाम कर सकता हूं?",
            "मेरी दवाइयों के बारे में बताएं",
            "मुझे दर्द हो रहा है",
            "घाव की देखभाल",
        ],
    }
}

pub const HIGH_SEVERITY_NOTICE: &str = "High severity - Doctor has been notified";
