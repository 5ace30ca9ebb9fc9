/// Bumped whenever the wording below changes so analyses can be traced to a prompt revision.
pub const PROMPT_VERSION: &str = "2024-06-trading-v1";

pub const TRADING_ANALYSIS_PROMPT: &str = r#"You are an expert trading analyst. Analyze this trading chart image and provide a comprehensive trading analysis including:

1. **Chart Pattern Recognition**: Identify any technical patterns (head and shoulders, triangles, flags, etc.)
2. **Trend Analysis**: Determine the current trend (uptrend, downtrend, sideways)
3. **Support & Resistance Levels**: Identify key support and resistance levels
4. **Technical Indicators**: Analyze any visible indicators (RSI, MACD, Moving Averages, etc.)
5. **Volume Analysis**: Comment on volume patterns if visible
6. **Trading Strategy**: Provide specific trading recommendations:
   - Entry points
   - Stop loss levels
   - Take profit targets
   - Risk/reward ratio
7. **Market Sentiment**: Overall market sentiment and confidence level
8. **Risk Assessment**: Potential risks and warnings

Please provide a detailed, actionable analysis that a trader can use to make informed decisions."#;
