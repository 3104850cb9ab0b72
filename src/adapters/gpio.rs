//! GPIO adapter — raw pin access behind [`GpioPort`].
//!
//! Configures pins lazily on first use: ADC channels through the oneshot
//! driver, digital pins through `gpio_config`, and PWM writes through LEDC
//! (timer 0, channels bound per pin, 8-bit duty).
//!
//! On non-espidf targets the adapter keeps pin state in memory; analog
//! readings can be preset with [`GpioAdapter::set_analog`] for bench runs.

use crate::app::ports::GpioPort;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::error;

pub struct GpioAdapter {
    #[cfg(target_os = "espidf")]
    adc_handle: adc_oneshot_unit_handle_t,
    /// Bitmask of ADC channels already configured.
    #[cfg(target_os = "espidf")]
    adc_configured: u32,
    /// Bitmask of pins configured as digital outputs / inputs.
    #[cfg(target_os = "espidf")]
    out_configured: u64,
    #[cfg(target_os = "espidf")]
    in_configured: u64,
    /// LEDC channel bindings: index = channel, value = bound pin.
    #[cfg(target_os = "espidf")]
    ledc_bound: [Option<u8>; 4],
    #[cfg(target_os = "espidf")]
    ledc_timer_ready: bool,

    #[cfg(not(target_os = "espidf"))]
    analog: HashMap<u8, i32>,
    #[cfg(not(target_os = "espidf"))]
    levels: HashMap<u8, i32>,
}

impl Default for GpioAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            adc_handle: core::ptr::null_mut(),
            #[cfg(target_os = "espidf")]
            adc_configured: 0,
            #[cfg(target_os = "espidf")]
            out_configured: 0,
            #[cfg(target_os = "espidf")]
            in_configured: 0,
            #[cfg(target_os = "espidf")]
            ledc_bound: [None; 4],
            #[cfg(target_os = "espidf")]
            ledc_timer_ready: false,
            #[cfg(not(target_os = "espidf"))]
            analog: HashMap::new(),
            #[cfg(not(target_os = "espidf"))]
            levels: HashMap::new(),
        }
    }

    /// Simulation only: preset the next analog readings for `pin`.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_analog(&mut self, pin: u8, value: i32) {
        self.analog.insert(pin, value);
    }

    // ── espidf helpers ────────────────────────────────────────

    /// ADC1 channel for a GPIO on the classic ESP32.
    #[cfg(target_os = "espidf")]
    fn adc1_channel(pin: u8) -> Option<u32> {
        match pin {
            36 => Some(0),
            37 => Some(1),
            38 => Some(2),
            39 => Some(3),
            32 => Some(4),
            33 => Some(5),
            34 => Some(6),
            35 => Some(7),
            _ => None,
        }
    }

    #[cfg(target_os = "espidf")]
    fn ensure_adc_channel(&mut self, channel: u32) -> bool {
        unsafe {
            if self.adc_handle.is_null() {
                let init_cfg = adc_oneshot_unit_init_cfg_t {
                    unit_id: adc_unit_t_ADC_UNIT_1,
                    ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                    ..Default::default()
                };
                let ret = adc_oneshot_new_unit(&init_cfg, &mut self.adc_handle);
                if ret != ESP_OK {
                    error!("gpio: ADC1 init failed ({ret})");
                    return false;
                }
            }
            if self.adc_configured & (1 << channel) == 0 {
                let chan_cfg = adc_oneshot_chan_cfg_t {
                    atten: adc_atten_t_ADC_ATTEN_DB_12,
                    bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
                };
                let ret = adc_oneshot_config_channel(self.adc_handle, channel, &chan_cfg);
                if ret != ESP_OK {
                    error!("gpio: ADC channel {channel} config failed ({ret})");
                    return false;
                }
                self.adc_configured |= 1 << channel;
            }
        }
        true
    }

    #[cfg(target_os = "espidf")]
    fn ensure_direction(&mut self, pin: u8, output: bool) {
        let mask = 1u64 << pin;
        let configured = if output {
            &mut self.out_configured
        } else {
            &mut self.in_configured
        };
        if *configured & mask != 0 {
            return;
        }
        let cfg = gpio_config_t {
            pin_bit_mask: mask,
            mode: if output {
                gpio_mode_t_GPIO_MODE_OUTPUT
            } else {
                gpio_mode_t_GPIO_MODE_INPUT
            },
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK {
            error!("gpio: pin {pin} config failed ({ret})");
            return;
        }
        *configured |= mask;
    }

    /// Bind (or find) an LEDC channel for `pin`, returning the channel.
    #[cfg(target_os = "espidf")]
    fn ledc_channel(&mut self, pin: u8) -> Option<u32> {
        unsafe {
            if !self.ledc_timer_ready {
                let timer_cfg = ledc_timer_config_t {
                    speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                    duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
                    timer_num: ledc_timer_t_LEDC_TIMER_0,
                    freq_hz: 1000,
                    clk_cfg: ledc_clk_cfg_t_LEDC_AUTO_CLK,
                    ..Default::default()
                };
                if ledc_timer_config(&timer_cfg) != ESP_OK {
                    error!("gpio: LEDC timer config failed");
                    return None;
                }
                self.ledc_timer_ready = true;
            }

            if let Some(at) = self.ledc_bound.iter().position(|b| *b == Some(pin)) {
                return Some(at as u32);
            }
            let free = self.ledc_bound.iter().position(Option::is_none)?;
            let chan_cfg = ledc_channel_config_t {
                gpio_num: i32::from(pin),
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel: free as u32,
                intr_type: ledc_intr_type_t_LEDC_INTR_DISABLE,
                timer_sel: ledc_timer_t_LEDC_TIMER_0,
                duty: 0,
                hpoint: 0,
                ..Default::default()
            };
            if ledc_channel_config(&chan_cfg) != ESP_OK {
                error!("gpio: LEDC channel bind for pin {pin} failed");
                return None;
            }
            self.ledc_bound[free] = Some(pin);
            Some(free as u32)
        }
    }
}

impl GpioPort for GpioAdapter {
    #[cfg(target_os = "espidf")]
    fn analog_read(&mut self, pin: u8) -> i32 {
        let Some(channel) = Self::adc1_channel(pin) else {
            error!("gpio: pin {pin} is not an ADC1 input");
            return -1;
        };
        if !self.ensure_adc_channel(channel) {
            return -1;
        }
        let mut raw: i32 = 0;
        let ret = unsafe { adc_oneshot_read(self.adc_handle, channel, &mut raw) };
        if ret != ESP_OK {
            return -1;
        }
        raw.max(0)
    }

    #[cfg(not(target_os = "espidf"))]
    fn analog_read(&mut self, pin: u8) -> i32 {
        self.analog.get(&pin).copied().unwrap_or(0)
    }

    #[cfg(target_os = "espidf")]
    fn analog_write(&mut self, pin: u8, value: i32) {
        if let Some(channel) = self.ledc_channel(pin) {
            unsafe {
                ledc_set_duty(
                    ledc_mode_t_LEDC_LOW_SPEED_MODE,
                    channel,
                    value.clamp(0, 255) as u32,
                );
                ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn analog_write(&mut self, pin: u8, value: i32) {
        self.levels.insert(pin, value);
    }

    #[cfg(target_os = "espidf")]
    fn digital_read(&mut self, pin: u8) -> i32 {
        self.ensure_direction(pin, false);
        unsafe { gpio_get_level(i32::from(pin)) }
    }

    #[cfg(not(target_os = "espidf"))]
    fn digital_read(&mut self, pin: u8) -> i32 {
        self.levels.get(&pin).copied().unwrap_or(0)
    }

    #[cfg(target_os = "espidf")]
    fn digital_write(&mut self, pin: u8, level: i32) {
        self.ensure_direction(pin, true);
        unsafe {
            gpio_set_level(i32::from(pin), u32::from(level != 0));
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn digital_write(&mut self, pin: u8, level: i32) {
        self.levels.insert(pin, i32::from(level != 0));
    }
}
